//! Runtime configuration read from the environment
//!
//! Values are loaded once at startup (after `dotenvy` has populated the
//! process environment from `.env`) and shared through [`AppState`].
//!
//! [`AppState`]: crate::database::AppState

use std::env;
use std::time::Duration;

/// Default upstream catalog root
pub const DEFAULT_POKEAPI_BASE_URL: &str = "https://pokeapi.co/api/v2";

const DEV_JWT_SECRET: &str = "insecure-dev-secret";

/// Application configuration
///
/// # Environment Variables
///
/// - `PORT` - Server port number (default: 8080)
/// - `DATABASE_URL` - Path to the redb file (default: "pokedex.db")
/// - `POKEAPI_BASE_URL` - Upstream catalog root
/// - `POKEAPI_CACHE_TTL` - Response cache TTL in seconds (default: 3600)
/// - `POKEAPI_TIMEOUT` - Per-attempt upstream timeout in seconds (default: 10)
/// - `JWT_SECRET` - HMAC secret for access, refresh and reset tokens
/// - `JWT_ACCESS_TTL` / `JWT_REFRESH_TTL` - Token lifetimes in seconds
/// - `PASSWORD_RESET_TTL` - Reset token lifetime in seconds (default: 3600)
/// - `FRONTEND_URL` - Base used to build password reset links
/// - `PRODUCTION_MODE` - When "true", reset tokens are never returned in responses
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub pokeapi_base_url: String,
    pub cache_ttl: Duration,
    pub upstream_timeout: Duration,
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
    pub frontend_url: String,
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "pokedex.db".to_string(),
            pokeapi_base_url: DEFAULT_POKEAPI_BASE_URL.to_string(),
            cache_ttl: Duration::from_secs(3600),
            upstream_timeout: Duration::from_secs(10),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_ttl: Duration::from_secs(30 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            reset_ttl: Duration::from_secs(3600),
            frontend_url: "http://localhost:4200".to_string(),
            production: false,
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables, falling back to
    /// [`Config::default`] for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET is not set, using the development secret");
                defaults.jwt_secret
            }
        };

        Self {
            port: parse_var("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pokeapi_base_url: env::var("POKEAPI_BASE_URL").unwrap_or(defaults.pokeapi_base_url),
            cache_ttl: seconds_var("POKEAPI_CACHE_TTL").unwrap_or(defaults.cache_ttl),
            upstream_timeout: seconds_var("POKEAPI_TIMEOUT").unwrap_or(defaults.upstream_timeout),
            jwt_secret,
            access_ttl: seconds_var("JWT_ACCESS_TTL").unwrap_or(defaults.access_ttl),
            refresh_ttl: seconds_var("JWT_REFRESH_TTL").unwrap_or(defaults.refresh_ttl),
            reset_ttl: seconds_var("PASSWORD_RESET_TTL").unwrap_or(defaults.reset_ttl),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            production: env::var("PRODUCTION_MODE").is_ok_and(|v| v == "true"),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn seconds_var(name: &str) -> Option<Duration> {
    parse_var::<u64>(name).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.pokeapi_base_url, "https://pokeapi.co/api/v2");
        assert!(!config.production);
    }
}
