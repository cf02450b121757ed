//! Mapping of raw catalog payloads onto the application's Pokémon shape

use serde_json::Value;

use super::{CatalogEntry, Pokemon, PokemonStats};

/// Scales a base stat onto the 0..=100 display range.
///
/// `round(base * 1.5)` with ties to even, then clamped.
pub fn scale_stat(base: i64) -> u8 {
    let scaled = (base as f64 * 1.5).round_ties_even();
    scaled.clamp(0.0, 100.0) as u8
}

/// Normalizes a `pokemon/{id}/` payload. Missing or malformed fields fall
/// back to empty values; this never fails.
pub fn normalize(raw: &Value) -> Pokemon {
    let sprites = &raw["sprites"];
    let sprite = non_empty_str(&sprites["other"]["official-artwork"]["front_default"])
        .or_else(|| non_empty_str(&sprites["front_default"]))
        .map(str::to_string);

    let types = raw["types"]
        .as_array()
        .map(|slots| {
            slots
                .iter()
                .filter_map(|slot| non_empty_str(&slot["type"]["name"]))
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    Pokemon {
        id: raw["id"].as_u64().and_then(|id| u32::try_from(id).ok()).unwrap_or(0),
        name: raw["name"].as_str().unwrap_or_default().to_string(),
        types,
        sprite,
        stats: PokemonStats {
            hp: scale_stat(base_stat(raw, "hp")),
            attack: scale_stat(base_stat(raw, "attack")),
            defense: scale_stat(base_stat(raw, "defense")),
        },
    }
}

/// Base value of the named entry in the payload's `stats` list, 0 if absent
/// or not a number.
fn base_stat(raw: &Value, name: &str) -> i64 {
    raw["stats"]
        .as_array()
        .and_then(|stats| {
            stats
                .iter()
                .find(|stat| stat["stat"]["name"].as_str() == Some(name))
        })
        .map(|stat| lenient_int(&stat["base_stat"]))
        .unwrap_or(0)
}

fn lenient_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Trailing numeric segment of a resource URL (`.../pokemon-species/25/` -> 25).
pub fn parse_id_from_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Builds a catalog from a list of `{name, url}` resources: invalid entries
/// dropped, sorted by id.
pub fn catalog_from_resources(resources: &Value) -> Vec<CatalogEntry> {
    let mut catalog: Vec<CatalogEntry> = resources
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = parse_id_from_url(item["url"].as_str()?)?;
                    let name = non_empty_str(&item["name"])?;
                    (id > 0).then(|| CatalogEntry {
                        id,
                        name: name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    catalog.sort_by_key(|entry| entry.id);
    catalog
}
