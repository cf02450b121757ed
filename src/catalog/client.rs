//! HTTP client for the upstream Pokémon catalog
//!
//! All requests are GETs. Responses with a status in the retry policy's set
//! are retried with exponential backoff; anything else that is not a 2xx
//! fails immediately, as do network errors.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use tracing::warn;

use super::CatalogError;

const USER_AGENT: &str = concat!("pokedex/", env!("CARGO_PKG_VERSION"), " (fair use cache)");

/// Upper bound for a single backoff sleep
pub const BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Retry behaviour for upstream calls
///
/// The delay before retry `n` (1-based) is zero for the first retry and
/// `backoff_factor * 2^(n-1)` afterwards, capped at [`BACKOFF_MAX`]. A numeric
/// `Retry-After` header takes precedence over the computed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_factor: Duration::from_secs(1),
            retry_statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl RetryPolicy {
    /// Same retryable statuses and attempt count, without sleeping.
    pub fn immediate() -> Self {
        Self {
            backoff_factor: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(retry - 1);
        self.backoff_factor.saturating_mul(multiplier).min(BACKOFF_MAX)
    }
}

/// Thin wrapper around `reqwest::Client` rooted at the catalog base URL
///
/// The timeout applies to each attempt separately; a request that is retried
/// four times may therefore take up to five timeouts plus the backoff sleeps.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(CatalogError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Full URL for an endpoint such as `pokemon/25/` or `pokemon?limit=20&offset=0`.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// GETs `endpoint` and decodes the JSON body, applying the retry policy.
    pub async fn get_json(&self, endpoint: &str) -> Result<(StatusCode, Value), CatalogError> {
        let url = self.url_for(endpoint);
        let mut retries = 0;

        loop {
            let response = match self.http.get(&url).send().await {
                Ok(response) => response,
                Err(source) if is_transient(&source) && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.backoff(retries);
                    warn!(
                        event = "pokeapi.fetch.retry",
                        url = %url,
                        error = %source,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        "pokeapi.fetch.retry"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(source) => {
                    return Err(CatalogError::Request {
                        url: url.clone(),
                        source,
                    })
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response
                    .json::<Value>()
                    .await
                    .map_err(|source| CatalogError::Request {
                        url: url.clone(),
                        source,
                    })?;
                return Ok((status, body));
            }

            if !self.retry.is_retryable(status) || retries >= self.retry.max_retries {
                return Err(CatalogError::Status {
                    url,
                    status: status.as_u16(),
                });
            }

            retries += 1;
            let delay = retry_after(&response).unwrap_or_else(|| self.retry.backoff(retries));
            warn!(
                event = "pokeapi.fetch.retry",
                url = %url,
                status = status.as_u16(),
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                "pokeapi.fetch.retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Connection failures, timeouts and dropped requests; never decode errors.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

fn retry_after(response: &Response) -> Option<Duration> {
    let seconds = response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(seconds).min(BACKOFF_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_retries_rate_limit_and_gateway_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 4);
        assert!(policy.is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.is_retryable(StatusCode::BAD_GATEWAY));
        assert!(policy.is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.is_retryable(StatusCode::GATEWAY_TIMEOUT));
        assert!(!policy.is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!policy.is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_doubles_after_first_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(30), BACKOFF_MAX);
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate();
        assert!((1..=4).all(|n| policy.backoff(n).is_zero()));
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let client = CatalogClient::new(
            "https://pokeapi.co/api/v2/",
            Duration::from_secs(10),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(client.url_for("/pokemon/25/"), "https://pokeapi.co/api/v2/pokemon/25/");
        assert_eq!(
            client.url_for("pokemon?limit=20&offset=0"),
            "https://pokeapi.co/api/v2/pokemon?limit=20&offset=0"
        );
    }
}
