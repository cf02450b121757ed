//! Storage operations for users, favorites and teams
//!
//! Every function runs in a single redb transaction. Write transactions are
//! committed only when the whole operation succeeded and aborted otherwise,
//! so a failed call never leaves partial state behind. Because redb
//! serializes writers and readers see a snapshot, a concurrent reader of a
//! team sees either the old slots or the new ones.

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;

use crate::database::{
    StoreError, TABLE_EMAIL_INDEX, TABLE_FAVORITES, TABLE_FAVORITE_INDEX, TABLE_SEQUENCES,
    TABLE_TEAM_INDEX, TABLE_TEAM_SLOTS, TABLE_USERNAME_INDEX, TABLE_USERS,
};
use crate::model::{FavoriteRecord, NewUser, TeamSlotRecord, UserRecord, MAX_TEAM_SIZE};

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

/// Runs `op` inside a write transaction, committing on success.
fn write<T>(
    db: &Database,
    op: impl FnOnce(&WriteTransaction) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let txn = db.begin_write()?;
    match op(&txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            txn.abort()?;
            Err(err)
        }
    }
}

fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, StoreError> {
    let mut table = txn.open_table(TABLE_SEQUENCES)?;
    let next = table.get(sequence)?.map(|guard| guard.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn index_key(value: &str) -> String {
    value.trim().to_lowercase()
}

// Users

pub fn create_user(db: &Database, new_user: NewUser) -> Result<UserRecord, StoreError> {
    write(db, |txn| {
        let username_key = index_key(&new_user.username);
        let email_key = new_user.email.as_deref().map(index_key);

        {
            let usernames = txn.open_table(TABLE_USERNAME_INDEX)?;
            if usernames.get(username_key.as_str())?.is_some() {
                return Err(StoreError::Conflict("username"));
            }
        }
        if let Some(email_key) = &email_key {
            let emails = txn.open_table(TABLE_EMAIL_INDEX)?;
            if emails.get(email_key.as_str())?.is_some() {
                return Err(StoreError::Conflict("email"));
            }
        }

        let now = Utc::now();
        let record = UserRecord {
            id: next_id(txn, "users")?,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            is_active: new_user.is_active,
            date_joined: now,
            password_changed_at: now,
        };

        let json = serde_json::to_string(&record)?;
        txn.open_table(TABLE_USERS)?.insert(record.id, json.as_str())?;
        txn.open_table(TABLE_USERNAME_INDEX)?
            .insert(username_key.as_str(), record.id)?;
        if let Some(email_key) = &email_key {
            txn.open_table(TABLE_EMAIL_INDEX)?
                .insert(email_key.as_str(), record.id)?;
        }
        Ok(record)
    })
}

pub fn get_user(db: &Database, user_id: u64) -> Result<Option<UserRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let users = read_txn.open_table(TABLE_USERS)?;
    let user = match users.get(user_id)? {
        Some(raw) => Some(decode(raw.value())?),
        None => None,
    };
    Ok(user)
}

fn user_by_index(
    db: &Database,
    index: redb::TableDefinition<'static, &'static str, u64>,
    value: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let id = {
        let table = read_txn.open_table(index)?;
        let guard = table.get(index_key(value).as_str())?;
        guard.map(|guard| guard.value())
    };
    let Some(id) = id else {
        return Ok(None);
    };
    let users = read_txn.open_table(TABLE_USERS)?;
    let user = match users.get(id)? {
        Some(raw) => Some(decode(raw.value())?),
        None => None,
    };
    Ok(user)
}

/// Case-insensitive lookup by username.
pub fn find_user_by_username(db: &Database, username: &str) -> Result<Option<UserRecord>, StoreError> {
    user_by_index(db, TABLE_USERNAME_INDEX, username)
}

/// Case-insensitive lookup by e-mail.
pub fn find_user_by_email(db: &Database, email: &str) -> Result<Option<UserRecord>, StoreError> {
    user_by_index(db, TABLE_EMAIL_INDEX, email)
}

/// All users ordered by username.
pub fn list_users(db: &Database) -> Result<Vec<UserRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let users = read_txn.open_table(TABLE_USERS)?;
    let mut records = users
        .iter()?
        .map(|entry| {
            let (_, raw) = entry?;
            decode::<UserRecord>(raw.value())
        })
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(records)
}

pub fn count_superusers(db: &Database) -> Result<usize, StoreError> {
    Ok(list_users(db)?.iter().filter(|user| user.is_superuser).count())
}

/// Replaces the stored user with `user` (matched by id), keeping the
/// username and e-mail indexes in sync. Returns `None` if the user is gone.
pub fn update_user(db: &Database, user: &UserRecord) -> Result<Option<UserRecord>, StoreError> {
    write(db, |txn| {
        let current: UserRecord = {
            let users = txn.open_table(TABLE_USERS)?;
            let Some(raw) = users.get(user.id)? else {
                return Ok(None);
            };
            decode(raw.value())?
        };

        let old_username = index_key(&current.username);
        let new_username = index_key(&user.username);
        if old_username != new_username {
            let mut usernames = txn.open_table(TABLE_USERNAME_INDEX)?;
            if usernames.get(new_username.as_str())?.is_some() {
                return Err(StoreError::Conflict("username"));
            }
            usernames.remove(old_username.as_str())?;
            usernames.insert(new_username.as_str(), user.id)?;
        }

        let old_email = current.email.as_deref().map(index_key);
        let new_email = user.email.as_deref().map(index_key);
        if old_email != new_email {
            let mut emails = txn.open_table(TABLE_EMAIL_INDEX)?;
            if let Some(new_email) = &new_email {
                if emails.get(new_email.as_str())?.is_some() {
                    return Err(StoreError::Conflict("email"));
                }
            }
            if let Some(old_email) = &old_email {
                emails.remove(old_email.as_str())?;
            }
            if let Some(new_email) = &new_email {
                emails.insert(new_email.as_str(), user.id)?;
            }
        }

        let json = serde_json::to_string(user)?;
        txn.open_table(TABLE_USERS)?.insert(user.id, json.as_str())?;
        Ok(Some(user.clone()))
    })
}

/// Deletes a user together with its favorites and team.
/// Returns `false` if no such user exists.
pub fn delete_user(db: &Database, user_id: u64) -> Result<bool, StoreError> {
    write(db, |txn| {
        let user: UserRecord = {
            let mut users = txn.open_table(TABLE_USERS)?;
            let Some(raw) = users.remove(user_id)? else {
                return Ok(false);
            };
            decode(raw.value())?
        };

        txn.open_table(TABLE_USERNAME_INDEX)?
            .remove(index_key(&user.username).as_str())?;
        if let Some(email) = &user.email {
            txn.open_table(TABLE_EMAIL_INDEX)?
                .remove(index_key(email).as_str())?;
        }

        clear_favorites(txn, user_id)?;
        clear_team(txn, user_id)?;
        Ok(true)
    })
}

// Favorites

/// Adds `pokemon_id` to the user's favorites.
///
/// Fails with [`StoreError::Conflict`] if it is already there.
pub fn add_favorite(db: &Database, user_id: u64, pokemon_id: u32) -> Result<FavoriteRecord, StoreError> {
    if pokemon_id == 0 {
        return Err(StoreError::Conflict("favorite_positive_pokemon_id"));
    }
    write(db, |txn| {
        let id = next_id(txn, "favorites")?;
        {
            let mut index = txn.open_table(TABLE_FAVORITE_INDEX)?;
            if index.insert((user_id, pokemon_id), id)?.is_some() {
                return Err(StoreError::Conflict("favorite_user_pokemon"));
            }
        }

        let record = FavoriteRecord {
            id,
            user_id,
            pokemon_id,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record)?;
        txn.open_table(TABLE_FAVORITES)?.insert(id, json.as_str())?;
        Ok(record)
    })
}

/// The user's favorites ordered by pokemon id.
pub fn list_favorites(db: &Database, user_id: u64) -> Result<Vec<FavoriteRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(TABLE_FAVORITE_INDEX)?;
    let favorites = read_txn.open_table(TABLE_FAVORITES)?;

    let mut records = Vec::new();
    for entry in index.range((user_id, 0u32)..=(user_id, u32::MAX))? {
        let (_, favorite_id) = entry?;
        if let Some(raw) = favorites.get(favorite_id.value())? {
            records.push(decode::<FavoriteRecord>(raw.value())?);
        }
    }
    Ok(records)
}

/// Removes a favorite owned by `user_id`.
///
/// Returns `false` when the favorite does not exist or belongs to someone else.
pub fn remove_favorite(db: &Database, user_id: u64, favorite_id: u64) -> Result<bool, StoreError> {
    write(db, |txn| {
        let record: FavoriteRecord = {
            let favorites = txn.open_table(TABLE_FAVORITES)?;
            let Some(raw) = favorites.get(favorite_id)? else {
                return Ok(false);
            };
            decode(raw.value())?
        };
        if record.user_id != user_id {
            return Ok(false);
        }

        txn.open_table(TABLE_FAVORITES)?.remove(favorite_id)?;
        txn.open_table(TABLE_FAVORITE_INDEX)?
            .remove((user_id, record.pokemon_id))?;
        Ok(true)
    })
}

fn clear_favorites(txn: &WriteTransaction, user_id: u64) -> Result<(), StoreError> {
    let mut index = txn.open_table(TABLE_FAVORITE_INDEX)?;
    let entries = index
        .range((user_id, 0u32)..=(user_id, u32::MAX))?
        .map(|entry| entry.map(|(key, id)| (key.value(), id.value())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut favorites = txn.open_table(TABLE_FAVORITES)?;
    for (key, favorite_id) in entries {
        index.remove(key)?;
        favorites.remove(favorite_id)?;
    }
    Ok(())
}

// Team

/// Replaces the user's whole team with `pokemon_ids`, numbered 1..=N in order.
///
/// Duplicates, ids of 0 or more than six entries violate the storage
/// constraints; the transaction is then aborted and the previous team stays.
pub fn set_team(db: &Database, user_id: u64, pokemon_ids: &[u32]) -> Result<Vec<TeamSlotRecord>, StoreError> {
    write(db, |txn| {
        clear_team(txn, user_id)?;

        let now = Utc::now();
        let mut slots = Vec::with_capacity(pokemon_ids.len());
        for (position, &pokemon_id) in pokemon_ids.iter().enumerate() {
            if position >= MAX_TEAM_SIZE {
                return Err(StoreError::Conflict("team_slot_range"));
            }
            if pokemon_id == 0 {
                return Err(StoreError::Conflict("team_positive_pokemon_id"));
            }
            let slot = position as u8 + 1;

            {
                let mut index = txn.open_table(TABLE_TEAM_INDEX)?;
                if index.insert((user_id, pokemon_id), slot)?.is_some() {
                    return Err(StoreError::Conflict("team_user_pokemon"));
                }
            }

            let record = TeamSlotRecord {
                id: next_id(txn, "team_slots")?,
                user_id,
                slot,
                pokemon_id,
                created_at: now,
                updated_at: now,
            };
            let json = serde_json::to_string(&record)?;
            let mut table = txn.open_table(TABLE_TEAM_SLOTS)?;
            if table.insert((user_id, slot), json.as_str())?.is_some() {
                return Err(StoreError::Conflict("team_user_slot"));
            }
            slots.push(record);
        }
        Ok(slots)
    })
}

/// The user's team ordered by slot.
pub fn list_team(db: &Database, user_id: u64) -> Result<Vec<TeamSlotRecord>, StoreError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_TEAM_SLOTS)?;
    let slots = table
        .range((user_id, 0u8)..=(user_id, u8::MAX))?
        .map(|entry| {
            let (_, raw) = entry?;
            decode::<TeamSlotRecord>(raw.value())
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slots)
}

fn clear_team(txn: &WriteTransaction, user_id: u64) -> Result<(), StoreError> {
    let mut slots = txn.open_table(TABLE_TEAM_SLOTS)?;
    let slot_keys = slots
        .range((user_id, 0u8)..=(user_id, u8::MAX))?
        .map(|entry| entry.map(|(key, _)| key.value()))
        .collect::<Result<Vec<_>, _>>()?;
    for key in slot_keys {
        slots.remove(key)?;
    }

    let mut index = txn.open_table(TABLE_TEAM_INDEX)?;
    let index_keys = index
        .range((user_id, 0u32)..=(user_id, u32::MAX))?
        .map(|entry| entry.map(|(key, _)| key.value()))
        .collect::<Result<Vec<_>, _>>()?;
    for key in index_keys {
        index.remove(key)?;
    }
    Ok(())
}
