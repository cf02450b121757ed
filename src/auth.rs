//! Password hashing, JWT issuance and the authenticated-user extractors

use argon2::{
    password_hash::{Error as PHCError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::database::AppState;
use crate::error::ApiError;
use crate::model::{TokenPair, UserRecord};
use crate::store;

pub const MISSING_CREDENTIALS: &str = "Authentication credentials were not provided.";
pub const INVALID_TOKEN: &str = "Given token not valid for any token type";

fn hash_with_argon2(password: &str) -> Result<String, PHCError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();
    Ok(hash)
}

fn verify_with_argon2(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hashes `password` with Argon2 on the blocking thread pool.
pub async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_with_argon2(&password))
        .await
        .map_err(|err| ApiError::Internal(format!("password hashing task failed: {}", err)))??;
    Ok(hash)
}

/// Checks `password` against a stored PHC hash on the blocking thread pool.
/// A malformed hash never matches.
pub async fn verify_password(hash: &str, password: &str) -> Result<bool, ApiError> {
    let (hash, password) = (hash.to_string(), password.to_string());
    tokio::task::spawn_blocking(move || verify_with_argon2(&hash, &password))
        .await
        .map_err(|err| ApiError::Internal(format!("password check task failed: {}", err)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: u64,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenKind,
    /// Password-change instant (µs) the reset token is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<i64>,
}

fn issue(config: &Config, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

fn claims_for(user_id: u64, kind: TokenKind, ttl: std::time::Duration) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: user_id,
        iat: now,
        exp: now + ttl.as_secs() as i64,
        token_type: kind,
        pwd: None,
    }
}

pub fn generate_access_token(config: &Config, user_id: u64) -> Result<String, jsonwebtoken::errors::Error> {
    issue(config, &claims_for(user_id, TokenKind::Access, config.access_ttl))
}

pub fn generate_token_pair(config: &Config, user_id: u64) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access: generate_access_token(config, user_id)?,
        refresh: issue(config, &claims_for(user_id, TokenKind::Refresh, config.refresh_ttl))?,
    })
}

/// Decodes `token` and checks signature, expiry and token type.
pub fn verify_token(config: &Config, token: &str, kind: TokenKind) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    (data.claims.token_type == kind).then_some(data.claims)
}

/// Reset token bound to the user's current password; it stops verifying
/// once the password changes.
pub fn generate_reset_token(config: &Config, user: &UserRecord) -> Result<String, jsonwebtoken::errors::Error> {
    let mut claims = claims_for(user.id, TokenKind::PasswordReset, config.reset_ttl);
    claims.pwd = Some(user.password_changed_at.timestamp_micros());
    issue(config, &claims)
}

pub fn verify_reset_token(config: &Config, token: &str, user: &UserRecord) -> bool {
    verify_token(config, token, TokenKind::PasswordReset).is_some_and(|claims| {
        claims.sub == user.id && claims.pwd == Some(user.password_changed_at.timestamp_micros())
    })
}

/// URL-safe encoding of a user id for reset links
pub fn encode_uid(user_id: u64) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

pub fn decode_uid(uid: &str) -> Option<u64> {
    let bytes = URL_SAFE_NO_PAD.decode(uid.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn get_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim)
}

/// The active user behind a valid access token
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = get_bearer(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized(MISSING_CREDENTIALS.into()))?;

        let claims = verify_token(&state.config, token, TokenKind::Access)
            .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.into()))?;

        let user = store::get_user(&state.db, claims.sub)?
            .filter(|user| user.is_active)
            .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

        Ok(CurrentUser(user))
    }
}

/// A [`CurrentUser`] with staff rights
#[derive(Clone, Debug)]
pub struct AdminUser(pub UserRecord);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id,
            username: "ash".into(),
            email: Some("ash@example.com".into()),
            password_hash: String::new(),
            is_staff: false,
            is_superuser: false,
            is_active: true,
            date_joined: now,
            password_changed_at: now,
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_with_argon2("S3nh@Ultra!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_with_argon2(&hash, "S3nh@Ultra!"));
        assert!(!verify_with_argon2(&hash, "wrong"));
        assert!(!verify_with_argon2("not-a-hash", "S3nh@Ultra!"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_runs_off_the_async_worker() {
        // inline hashing would finish within the first poll and beat the timer
        let pending = tokio::time::timeout(
            std::time::Duration::from_micros(100),
            hash_password("S3nh@Ultra!"),
        )
        .await;
        assert!(pending.is_err());

        let (first, second) = tokio::join!(hash_password("S3nh@Ultra!"), hash_password("S3nh@Ultra!"));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);

        assert!(verify_password(&first, "S3nh@Ultra!").await.unwrap());
        assert!(!verify_password(&second, "wrong").await.unwrap());
        assert!(!verify_password("not-a-hash", "S3nh@Ultra!").await.unwrap());
    }

    #[test]
    fn token_type_is_enforced() {
        let config = Config::default();
        let pair = generate_token_pair(&config, 7).unwrap();
        assert_eq!(verify_token(&config, &pair.access, TokenKind::Access).unwrap().sub, 7);
        assert!(verify_token(&config, &pair.access, TokenKind::Refresh).is_none());
        assert!(verify_token(&config, &pair.refresh, TokenKind::Refresh).is_some());
        assert!(verify_token(&config, "garbage", TokenKind::Access).is_none());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let config = Config::default();
        let other = Config {
            jwt_secret: "another-secret".into(),
            ..Config::default()
        };
        let token = generate_access_token(&other, 1).unwrap();
        assert!(verify_token(&config, &token, TokenKind::Access).is_none());
    }

    #[test]
    fn reset_token_dies_with_password_change() {
        let config = Config::default();
        let mut user = user(3);
        let token = generate_reset_token(&config, &user).unwrap();
        assert!(verify_reset_token(&config, &token, &user));
        assert!(!verify_reset_token(&config, &token, &self::user(4)));

        user.password_changed_at += chrono::Duration::microseconds(1);
        assert!(!verify_reset_token(&config, &token, &user));
    }

    #[test]
    fn uid_roundtrip() {
        assert_eq!(decode_uid(&encode_uid(42)), Some(42));
        assert_eq!(decode_uid("%%%"), None);
    }
}
