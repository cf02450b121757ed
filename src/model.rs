//! Data models for the Pokédex backend
//!
//! Stored records (users, favorites, team slots) and the request/response
//! bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Pokemon;

/// Maximum number of slots in a team
pub const MAX_TEAM_SIZE: usize = 6;

/// A user account as stored in the database
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub email: Option<String>,
    /// Argon2 PHC string
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    /// Reset tokens issued before this instant are rejected
    pub password_changed_at: DateTime<Utc>,
}

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
}

/// A favorite Pokémon of a user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FavoriteRecord {
    pub id: u64,
    pub user_id: u64,
    pub pokemon_id: u32,
    pub created_at: DateTime<Utc>,
}

/// One position of a user's team
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamSlotRecord {
    pub id: u64,
    pub user_id: u64,
    /// 1..=6
    pub slot: u8,
    pub pokemon_id: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub email: Option<String>,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_staff: user.is_staff,
            date_joined: user.date_joined,
        }
    }
}

/// User view returned by the admin endpoints
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminUserResponse {
    pub id: u64,
    pub username: String,
    pub email: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<&UserRecord> for AdminUserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_staff: user.is_staff,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            date_joined: user.date_joined,
        }
    }
}

/// A favorite enriched with catalog detail (`null` when the lookup failed)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FavoriteResponse {
    pub id: u64,
    pub pokemon_id: u32,
    pub pokemon: Option<Pokemon>,
}

/// A team slot enriched with catalog detail (`null` when the lookup failed)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TeamSlotResponse {
    pub id: u64,
    pub slot: u8,
    pub pokemon_id: u32,
    pub pokemon: Option<Pokemon>,
}

/// Request payload for adding a favorite
///
/// # Example
/// ```json
/// { "pokemon_id": 25 }
/// ```
#[derive(Deserialize, Debug)]
pub struct AddFavoriteRequest {
    pub pokemon_id: Option<i64>,
}

/// Request payload for replacing the team
///
/// # Example
/// ```json
/// { "pokemon_ids": [1, 4, 7] }
/// ```
#[derive(Deserialize, Debug)]
pub struct SetTeamRequest {
    pub pokemon_ids: Option<Vec<i64>>,
}

/// `{"detail": "..."}` message body
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Response of a password reset request
///
/// `uid` and `token` are only included outside production mode, where the
/// e-mail carrying them is not actually sent.
#[derive(Serialize, Deserialize, Debug)]
pub struct PasswordResetResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct PasswordResetConfirmRequest {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Deserialize, Debug)]
pub struct AdminUserCreateRequest {
    #[serde(default)]
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
    pub password_confirm: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Partial update; absent fields are left unchanged
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct AdminUserUpdateRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct AdminPasswordRequest {
    pub new_password: String,
}

fn default_true() -> bool {
    true
}
