//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database that stores
//! users and their collections. Records are stored as JSON strings; the
//! secondary index tables enforce the uniqueness rules at the storage level.

use redb::{Database, TableDefinition};
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::PokeApi;
use crate::config::Config;

/// Users by id
///
/// Key: user id
/// Value: JSON-serialized UserRecord
pub const TABLE_USERS: TableDefinition<u64, &str> = TableDefinition::new("users_v1");

/// Lowercased username -> user id (usernames are unique case-insensitively)
pub const TABLE_USERNAME_INDEX: TableDefinition<&str, u64> = TableDefinition::new("users_by_username_v1");

/// Lowercased e-mail -> user id (only users with an e-mail appear here)
pub const TABLE_EMAIL_INDEX: TableDefinition<&str, u64> = TableDefinition::new("users_by_email_v1");

/// Favorites by id
///
/// Key: favorite id
/// Value: JSON-serialized FavoriteRecord
pub const TABLE_FAVORITES: TableDefinition<u64, &str> = TableDefinition::new("favorites_v1");

/// `(user_id, pokemon_id)` -> favorite id
///
/// At most one favorite per user and Pokémon. Range scans over
/// `(user_id, 0)..=(user_id, u32::MAX)` yield a user's favorites ordered by
/// pokemon id.
pub const TABLE_FAVORITE_INDEX: TableDefinition<(u64, u32), u64> = TableDefinition::new("favorites_by_user_v1");

/// `(user_id, slot)` -> JSON-serialized TeamSlotRecord
pub const TABLE_TEAM_SLOTS: TableDefinition<(u64, u8), &str> = TableDefinition::new("team_slots_v1");

/// `(user_id, pokemon_id)` -> slot (a Pokémon appears once per team)
pub const TABLE_TEAM_INDEX: TableDefinition<(u64, u32), u8> = TableDefinition::new("team_by_pokemon_v1");

/// Named id sequences ("users", "favorites", "team_slots")
pub const TABLE_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences_v1");

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,
    /// Cached catalog access
    pub pokeapi: PokeApi,
    pub config: Arc<Config>,
}

/// Failures of the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::Error),
    #[error("corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
    /// A uniqueness or range constraint was violated; names the constraint.
    #[error("constraint violated: {0}")]
    Conflict(&'static str),
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Database(err.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Database(err.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Database(err.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Database(err.into())
    }
}

/// Initializes the embedded database and creates required tables
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "pokedex.db")
///
/// # Example
///
/// ```no_run
/// # use pokedex::database::init_db;
/// let db = init_db("pokedex.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_USERS)?;
        write_txn.open_table(TABLE_USERNAME_INDEX)?;
        write_txn.open_table(TABLE_EMAIL_INDEX)?;
        write_txn.open_table(TABLE_FAVORITES)?;
        write_txn.open_table(TABLE_FAVORITE_INDEX)?;
        write_txn.open_table(TABLE_TEAM_SLOTS)?;
        write_txn.open_table(TABLE_TEAM_INDEX)?;
        write_txn.open_table(TABLE_SEQUENCES)?;
    }
    write_txn.commit()?;

    Ok(db)
}
