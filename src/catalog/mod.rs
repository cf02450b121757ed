//! Integration with the upstream Pokémon catalog (PokéAPI v2)
//!
//! [`PokeApi`] ties together the HTTP client, the shared response cache and
//! the normalizer. Every upstream read goes through [`PokeApi::fetch_json`],
//! so a response is fetched at most once per cache TTL.

pub mod cache;
pub mod client;
pub mod normalize;
pub mod query;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;
use cache::{cache_key, MemoryCache, ResponseCache};
use client::{CatalogClient, RetryPolicy};
use normalize::{catalog_from_resources, normalize};

pub use query::{ListOptions, PokemonPage, PokemonQuery};

/// Errors raised while talking to the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to build catalog client")]
    Client(#[source] reqwest::Error),
    #[error("error querying the catalog at {url}: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("catalog returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid generation: {0}")]
    InvalidGeneration(String),
}

impl CatalogError {
    /// True when the upstream answered 404 for the requested resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Status { status: 404, .. })
    }
}

/// Display stats, each in 0..=100
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PokemonStats {
    pub hp: u8,
    pub attack: u8,
    pub defense: u8,
}

/// Normalized view of a catalog Pokémon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Pokemon {
    pub id: u32,
    pub name: String,
    pub types: Vec<String>,
    pub sprite: Option<String>,
    pub stats: PokemonStats,
}

/// Lightweight `{id, name}` pair used for listing before detail fetches
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
}

/// Cached, retrying access to the catalog
#[derive(Clone)]
pub struct PokeApi {
    client: CatalogClient,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl PokeApi {
    pub fn new(client: CatalogClient, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self { client, cache, ttl }
    }

    /// Client with the default retry policy and an in-process cache.
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let client = CatalogClient::new(
            &config.pokeapi_base_url,
            config.upstream_timeout,
            RetryPolicy::default(),
        )?;
        Ok(Self::new(client, Arc::new(MemoryCache::new()), config.cache_ttl))
    }

    /// Raw JSON for `endpoint`, from the cache when fresh, otherwise upstream.
    /// Only successful responses are cached.
    pub async fn fetch_json(&self, endpoint: &str) -> Result<Value, CatalogError> {
        let key = cache_key(endpoint);
        if let Some(cached) = self.cache.get(&key) {
            info!(event = "pokeapi.cache.hit", endpoint = %endpoint, "pokeapi.cache.hit");
            return Ok(cached);
        }

        let url = self.client.url_for(endpoint);
        info!(event = "pokeapi.fetch", url = %url, "pokeapi.fetch");

        match self.client.get_json(endpoint).await {
            Ok((status, data)) => {
                self.cache.set(&key, data.clone(), self.ttl);
                info!(
                    event = "pokeapi.fetch.success",
                    url = %url,
                    status_code = status.as_u16(),
                    cached = true,
                    "pokeapi.fetch.success"
                );
                Ok(data)
            }
            Err(err) => {
                error!(
                    event = "pokeapi.fetch.error",
                    url = %url,
                    error = %err,
                    "pokeapi.fetch.error"
                );
                Err(err)
            }
        }
    }

    /// Normalized detail for a Pokémon id or name.
    pub async fn get_pokemon(&self, identifier: impl Display) -> Result<Pokemon, CatalogError> {
        let data = self.fetch_json(&format!("pokemon/{}/", identifier)).await?;
        Ok(normalize(&data))
    }

    /// Species of one generation, sorted by id.
    pub async fn generation_catalog(&self, generation: u32) -> Result<Vec<CatalogEntry>, CatalogError> {
        let payload = self.fetch_json(&format!("generation/{}/", generation)).await?;
        Ok(catalog_from_resources(&payload["pokemon_species"]))
    }

    /// Every Pokémon known upstream (first 2000 entries), sorted by id.
    pub async fn global_catalog(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let payload = self.fetch_json("pokemon?limit=2000&offset=0").await?;
        Ok(catalog_from_resources(&payload["results"]))
    }
}
