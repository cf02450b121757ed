//! Filtering and pagination over the catalog
//!
//! Three modes, chosen from the filters present:
//!
//! - no filters: page straight through the upstream listing endpoint;
//! - generation and/or name: slice the sorted `{id, name}` catalog;
//! - type (optionally combined with the above): scan the catalog in batches,
//!   fetching details until enough matches are collected.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CatalogEntry, CatalogError, PokeApi, Pokemon};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 50;

/// Number of catalog entries examined per round of the type scan
pub const TYPE_SCAN_BATCH: usize = 50;

/// Raw query string of `GET /api/pokemon/`
///
/// Everything arrives as text so malformed numbers can fall back to defaults
/// instead of rejecting the request.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct PokemonQuery {
    pub generation: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Validated listing options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub generation: Option<u32>,
    pub name: Option<String>,
    pub type_: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl TryFrom<&PokemonQuery> for ListOptions {
    type Error = CatalogError;

    fn try_from(query: &PokemonQuery) -> Result<Self, Self::Error> {
        let generation = match query.generation.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(id) if id > 0 => Some(id),
                _ => return Err(CatalogError::InvalidGeneration(raw.to_string())),
            },
        };

        let limit = query
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|limit| limit.clamp(1, MAX_LIMIT as i64) as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let offset = query
            .offset
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|offset| offset.max(0) as usize)
            .unwrap_or(0);

        Ok(Self {
            generation,
            name: filter_value(query.name.as_deref()),
            type_: filter_value(query.type_.as_deref()),
            limit,
            offset,
        })
    }
}

fn filter_value(raw: Option<&str>) -> Option<String> {
    raw.map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

/// One page of normalized results
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PokemonPage {
    pub count: u64,
    pub results: Vec<Pokemon>,
}

impl PokeApi {
    /// Lists Pokémon according to `query`.
    ///
    /// With a type filter, `count` is the number of matches found before the
    /// scan stopped, not the total number of matches in the catalog.
    pub async fn list_pokemon(&self, query: &PokemonQuery) -> Result<PokemonPage, CatalogError> {
        let options = ListOptions::try_from(query)?;

        if options.generation.is_none() && options.name.is_none() && options.type_.is_none() {
            return self.list_unfiltered(options.limit, options.offset).await;
        }

        let mut catalog = match options.generation {
            Some(generation) => self.generation_catalog(generation).await?,
            None => self.global_catalog().await?,
        };

        if let Some(name) = &options.name {
            catalog.retain(|entry| entry.name.to_lowercase().contains(name.as_str()));
        }

        match &options.type_ {
            Some(type_name) => Ok(self.scan_by_type(&catalog, type_name, options.limit, options.offset).await),
            None => {
                let mut results = Vec::new();
                for entry in catalog.iter().skip(options.offset).take(options.limit) {
                    results.push(self.get_pokemon(&entry.name).await?);
                }
                Ok(PokemonPage {
                    count: catalog.len() as u64,
                    results,
                })
            }
        }
    }

    async fn list_unfiltered(&self, limit: usize, offset: usize) -> Result<PokemonPage, CatalogError> {
        let payload = self
            .fetch_json(&format!("pokemon?limit={}&offset={}", limit, offset))
            .await?;

        let mut results = Vec::new();
        if let Some(entries) = payload["results"].as_array() {
            for name in entries.iter().filter_map(|entry| entry["name"].as_str()) {
                results.push(self.get_pokemon(name).await?);
            }
        }

        let count = payload["count"].as_u64().unwrap_or(results.len() as u64);
        Ok(PokemonPage { count, results })
    }

    async fn scan_by_type(
        &self,
        catalog: &[CatalogEntry],
        type_name: &str,
        limit: usize,
        offset: usize,
    ) -> PokemonPage {
        let wanted = offset + limit;
        let mut matches: Vec<Pokemon> = Vec::new();

        'batches: for batch in catalog.chunks(TYPE_SCAN_BATCH) {
            for entry in batch {
                match self.get_pokemon(&entry.name).await {
                    Ok(pokemon) => {
                        if pokemon.types.iter().any(|t| t.eq_ignore_ascii_case(type_name)) {
                            matches.push(pokemon);
                        }
                    }
                    Err(err) => {
                        debug!(pokemon = %entry.name, error = %err, "skipping entry in type scan");
                        continue;
                    }
                }
                if matches.len() >= wanted {
                    break 'batches;
                }
            }
        }

        let count = matches.len() as u64;
        let results = matches.into_iter().skip(offset).take(limit).collect();
        PokemonPage { count, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::cache::{cache_key, MemoryCache, ResponseCache};
    use crate::catalog::client::{CatalogClient, RetryPolicy};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn query(pairs: &[(&str, &str)]) -> PokemonQuery {
        let mut query = PokemonQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "generation" => query.generation = value,
                "name" => query.name = value,
                "type" => query.type_ = value,
                "limit" => query.limit = value,
                "offset" => query.offset = value,
                _ => unreachable!(),
            }
        }
        query
    }

    fn detail(id: u32, name: &str, types: &[&str]) -> Value {
        let types: Vec<Value> = types
            .iter()
            .map(|t| json!({"type": {"name": t}}))
            .collect();
        json!({"id": id, "name": name, "types": types, "sprites": {}, "stats": []})
    }

    /// Catalog whose upstream is unreachable: only seeded entries resolve.
    fn seeded_api(entries: Vec<(&str, Value)>) -> PokeApi {
        let cache = Arc::new(MemoryCache::new());
        for (endpoint, value) in entries {
            cache.set(&cache_key(endpoint), value, Duration::from_secs(60));
        }
        let client = CatalogClient::new("http://127.0.0.1:1", Duration::from_secs(1), RetryPolicy::immediate()).unwrap();
        PokeApi::new(client, cache, Duration::from_secs(60))
    }

    fn generation_one() -> Vec<(&'static str, Value)> {
        vec![
            (
                "generation/1/",
                json!({"pokemon_species": [
                    {"name": "venusaur", "url": "https://pokeapi.co/api/v2/pokemon-species/3/"},
                    {"name": "bulbasaur", "url": "https://pokeapi.co/api/v2/pokemon-species/1/"},
                    {"name": "ivysaur", "url": "https://pokeapi.co/api/v2/pokemon-species/2/"}
                ]}),
            ),
            ("pokemon/bulbasaur/", detail(1, "bulbasaur", &["grass", "poison"])),
            ("pokemon/ivysaur/", detail(2, "ivysaur", &["grass", "poison"])),
            ("pokemon/venusaur/", detail(3, "venusaur", &["grass", "poison"])),
        ]
    }

    #[test]
    fn limit_and_offset_are_clamped() {
        let options = ListOptions::try_from(&query(&[("limit", "200"), ("offset", "-10")])).unwrap();
        assert_eq!(options.limit, 50);
        assert_eq!(options.offset, 0);

        let options = ListOptions::try_from(&query(&[("limit", "0")])).unwrap();
        assert_eq!(options.limit, 1);
    }

    #[test]
    fn non_numeric_paging_falls_back_to_defaults() {
        let options = ListOptions::try_from(&query(&[("limit", "lots"), ("offset", "x")])).unwrap();
        assert_eq!(options.limit, DEFAULT_LIMIT);
        assert_eq!(options.offset, 0);
    }

    #[test]
    fn blank_filters_are_ignored() {
        let options = ListOptions::try_from(&query(&[("name", "   "), ("type", ""), ("generation", " ")])).unwrap();
        assert_eq!(options.name, None);
        assert_eq!(options.type_, None);
        assert_eq!(options.generation, None);
    }

    #[test]
    fn generation_must_be_positive_integer() {
        for raw in ["0", "-1", "one", "1.5"] {
            let err = ListOptions::try_from(&query(&[("generation", raw)])).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidGeneration(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn unfiltered_listing_uses_clamped_upstream_paging() {
        let api = seeded_api(vec![
            (
                "pokemon?limit=50&offset=0",
                json!({"count": 1, "results": [{"name": "bulbasaur", "url": "https://x/pokemon/1/"}]}),
            ),
            ("pokemon/bulbasaur/", detail(1, "bulbasaur", &["grass"])),
        ]);

        let page = api
            .list_pokemon(&query(&[("limit", "200"), ("offset", "-10")]))
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "bulbasaur");
    }

    #[tokio::test]
    async fn generation_filter_slices_catalog_by_id() {
        let api = seeded_api(generation_one());

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("limit", "2"), ("offset", "1")]))
            .await
            .unwrap();
        assert_eq!(page.count, 3);
        let names: Vec<&str> = page.results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ivysaur", "venusaur"]);
    }

    #[tokio::test]
    async fn name_filter_is_case_insensitive_substring() {
        let api = seeded_api(generation_one());

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("name", "SAUR"), ("offset", "0")]))
            .await
            .unwrap();
        assert_eq!(page.count, 3);

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("name", "Ivy")]))
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, 2);
    }

    #[tokio::test]
    async fn type_scan_skips_failed_lookups() {
        let api = seeded_api(vec![
            (
                "generation/1/",
                json!({"pokemon_species": [
                    {"name": "bulbasaur", "url": "https://x/pokemon-species/1/"},
                    {"name": "missing", "url": "https://x/pokemon-species/2/"},
                    {"name": "charmander", "url": "https://x/pokemon-species/4/"},
                    {"name": "squirtle", "url": "https://x/pokemon-species/7/"},
                    {"name": "vulpix", "url": "https://x/pokemon-species/37/"}
                ]}),
            ),
            ("pokemon/bulbasaur/", detail(1, "bulbasaur", &["grass", "poison"])),
            ("pokemon/charmander/", detail(4, "charmander", &["fire"])),
            ("pokemon/squirtle/", detail(7, "squirtle", &["water"])),
            ("pokemon/vulpix/", detail(37, "vulpix", &["fire"])),
        ]);

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("type", "FIRE")]))
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        let ids: Vec<u32> = page.results.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 37]);
    }

    #[tokio::test]
    async fn type_scan_stops_once_page_is_filled() {
        let api = seeded_api(vec![
            (
                "generation/1/",
                json!({"pokemon_species": [
                    {"name": "charmander", "url": "https://x/pokemon-species/4/"},
                    {"name": "charmeleon", "url": "https://x/pokemon-species/5/"},
                    {"name": "charizard", "url": "https://x/pokemon-species/6/"}
                ]}),
            ),
            ("pokemon/charmander/", detail(4, "charmander", &["fire"])),
            ("pokemon/charmeleon/", detail(5, "charmeleon", &["fire"])),
            ("pokemon/charizard/", detail(6, "charizard", &["fire", "flying"])),
        ]);

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("type", "fire"), ("limit", "1"), ("offset", "1")]))
            .await
            .unwrap();
        // count reflects only what the scan saw before stopping
        assert_eq!(page.count, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "charmeleon");
    }

    #[tokio::test]
    async fn offset_past_matches_returns_empty_page() {
        let api = seeded_api(generation_one());

        let page = api
            .list_pokemon(&query(&[("generation", "1"), ("type", "grass"), ("offset", "10")]))
            .await
            .unwrap();
        assert_eq!(page.count, 3);
        assert!(page.results.is_empty());
    }
}
