//! HTTP request handlers for the catalog and the user collections
//!
//! This module implements:
//! - Listing and fetching Pokémon from the upstream catalog
//! - Managing a user's favorites
//! - Reading and atomically replacing a user's team
//!
//! Collection responses embed the normalized Pokémon of each entry. A failed
//! lookup yields `"pokemon": null` for that entry instead of failing the
//! whole request.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::CurrentUser;
use crate::catalog::{PokeApi, Pokemon, PokemonPage, PokemonQuery};
use crate::database::{AppState, StoreError};
use crate::error::{ApiError, ApiResult};
use crate::model::{
    AddFavoriteRequest, FavoriteRecord, FavoriteResponse, SetTeamRequest, TeamSlotRecord,
    TeamSlotResponse,
};
use crate::store;
use crate::validation::{self, ValidationErrors};

pub const DUPLICATE_FAVORITE: &str = "This Pokémon is already in your favorites.";
pub const INVALID_TEAM: &str = "Invalid team. Check for duplicates or slots outside the 1..6 range.";

/// Liveness probe
///
/// # Response
///
/// ```json
/// { "status": "ok" }
/// ```
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Lists Pokémon with optional filters
///
/// # Query Parameters
///
/// - `generation` - Positive generation number
/// - `name` - Case-insensitive substring of the name
/// - `type` - Exact type name
/// - `limit` - Page size (default 20, clamped to 1..=50)
/// - `offset` - Number of matches to skip (default 0)
///
/// # Response
///
/// - **200 OK** - `{"count": n, "results": [...]}`
/// - **400 Bad Request** - `generation` is not a positive integer
/// - **500 Internal Server Error** - Upstream catalog failure
pub async fn list_pokemon(
    State(state): State<AppState>,
    Query(query): Query<PokemonQuery>,
) -> ApiResult<Json<PokemonPage>> {
    info!(
        event = "pokemon.list.request",
        generation = ?query.generation,
        name = ?query.name,
        type_ = ?query.type_,
        limit = ?query.limit,
        offset = ?query.offset,
        "listing pokemon"
    );

    // failures are logged once, where ApiError renders the response
    let page = state.pokeapi.list_pokemon(&query).await?;
    info!(
        event = "pokemon.list.success",
        count = page.count,
        returned = page.results.len(),
        "listed pokemon"
    );
    Ok(Json(page))
}

/// Fetches a single normalized Pokémon by id or name
///
/// # Response
///
/// - **200 OK** - The normalized Pokémon
/// - **404 Not Found** - The catalog does not know the identifier
/// - **500 Internal Server Error** - Upstream catalog failure
pub async fn get_pokemon(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<Pokemon>> {
    let identifier = identifier.trim().to_lowercase();
    match state.pokeapi.get_pokemon(&identifier).await {
        Ok(pokemon) => Ok(Json(pokemon)),
        Err(err) if err.is_not_found() => Err(ApiError::NotFound),
        Err(err) => Err(err.into()),
    }
}

async fn lookup_pokemon(pokeapi: &PokeApi, pokemon_id: u32) -> Option<Pokemon> {
    match pokeapi.get_pokemon(pokemon_id).await {
        Ok(pokemon) => Some(pokemon),
        Err(err) => {
            warn!(
                event = "pokemon.enrich.error",
                pokemon_id,
                error = %err,
                "pokemon detail unavailable"
            );
            None
        }
    }
}

async fn favorite_response(pokeapi: &PokeApi, favorite: FavoriteRecord) -> FavoriteResponse {
    FavoriteResponse {
        id: favorite.id,
        pokemon_id: favorite.pokemon_id,
        pokemon: lookup_pokemon(pokeapi, favorite.pokemon_id).await,
    }
}

async fn team_responses(pokeapi: &PokeApi, slots: Vec<TeamSlotRecord>) -> Vec<TeamSlotResponse> {
    let mut response = Vec::with_capacity(slots.len());
    for slot in slots {
        response.push(TeamSlotResponse {
            id: slot.id,
            slot: slot.slot,
            pokemon_id: slot.pokemon_id,
            pokemon: lookup_pokemon(pokeapi, slot.pokemon_id).await,
        });
    }
    response
}

/// Lists the caller's favorites ordered by pokemon id
pub async fn list_favorites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<FavoriteResponse>>> {
    let favorites = store::list_favorites(&state.db, user.id)?;

    let mut response = Vec::with_capacity(favorites.len());
    for favorite in favorites {
        response.push(favorite_response(&state.pokeapi, favorite).await);
    }
    Ok(Json(response))
}

/// Adds a favorite for the caller
///
/// # Request Body
///
/// ```json
/// { "pokemon_id": 25 }
/// ```
///
/// # Response
///
/// - **201 Created** - The new favorite
/// - **400 Bad Request** - Missing or non-positive id, or already a favorite
pub async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<AddFavoriteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FavoriteResponse>)> {
    let Json(payload) = payload?;
    let pokemon_id = validation::validate_pokemon_id(payload.pokemon_id)?;

    let favorite = match store::add_favorite(&state.db, user.id, pokemon_id) {
        Ok(favorite) => favorite,
        Err(StoreError::Conflict(_)) => {
            return Err(ValidationErrors::field("pokemon_id", DUPLICATE_FAVORITE).into());
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        event = "favorite.add",
        user_id = user.id,
        pokemon_id,
        favorite_id = favorite.id,
        "favorite added"
    );

    let response = favorite_response(&state.pokeapi, favorite).await;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Removes one of the caller's favorites
///
/// # Response
///
/// - **204 No Content** - Removed
/// - **404 Not Found** - No such favorite, or it belongs to another user
pub async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(favorite_id): Path<u64>,
) -> ApiResult<StatusCode> {
    if !store::remove_favorite(&state.db, user.id, favorite_id)? {
        return Err(ApiError::NotFound);
    }

    info!(event = "favorite.remove", user_id = user.id, favorite_id, "favorite removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Lists the caller's team ordered by slot
pub async fn list_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<TeamSlotResponse>>> {
    let slots = store::list_team(&state.db, user.id)?;
    Ok(Json(team_responses(&state.pokeapi, slots).await))
}

/// Replaces the caller's whole team
///
/// Ids are assigned to slots 1..n in the order given. The replacement is a
/// single transaction: on any failure the previous team is left untouched.
///
/// # Request Body
///
/// ```json
/// { "pokemon_ids": [1, 4, 7] }
/// ```
///
/// # Response
///
/// - **200 OK** - The new team
/// - **400 Bad Request** - Non-positive ids, duplicates or more than six ids
pub async fn set_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<SetTeamRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<TeamSlotResponse>>> {
    let Json(payload) = payload?;
    let pokemon_ids = validation::validate_team(payload.pokemon_ids)?;

    info!(
        event = "team.update.request",
        user_id = user.id,
        pokemon_ids = ?pokemon_ids,
        "replacing team"
    );

    let slots = match store::set_team(&state.db, user.id, &pokemon_ids) {
        Ok(slots) => slots,
        Err(StoreError::Conflict(constraint)) => {
            warn!(
                event = "team.update.conflict",
                user_id = user.id,
                constraint,
                "team rejected by storage constraint"
            );
            return Err(ValidationErrors::field("pokemon_ids", INVALID_TEAM).into());
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        event = "team.update.success",
        user_id = user.id,
        size = slots.len(),
        "team replaced"
    );

    Ok(Json(team_responses(&state.pokeapi, slots).await))
}
