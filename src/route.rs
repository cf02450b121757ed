//! Route definitions for the Pokédex API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.
//! It creates the Axum router with the application state.

use axum::routing::{delete, get, post};
use axum::{middleware, Router};

use crate::account::{
    admin_reset_password, change_password, confirm_password_reset, create_user, delete_user,
    get_user, list_users, me, obtain_token, refresh_token, register, request_password_reset,
    update_user,
};
use crate::database::AppState;
use crate::handler::{
    add_favorite, get_pokemon, health, list_favorites, list_pokemon, list_team, remove_favorite,
    set_team,
};
use crate::middleware::request_id_middleware;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /`, `GET /health/` - Liveness probe
/// - `GET /api/pokemon/` - Filtered, paginated catalog listing (public)
/// - `GET /api/pokemon/{id_or_name}/` - Single normalized Pokémon (public)
/// - `GET|POST /api/favorites/`, `DELETE /api/favorites/{id}/` - Caller's favorites
/// - `GET /api/team/`, `POST /api/team/set/` - Caller's team
/// - `/auth/...` - Registration, tokens, password flows and user administration
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use pokedex::catalog::PokeApi;
/// # use pokedex::config::Config;
/// # use pokedex::database::{init_db, AppState};
/// # use pokedex::route::create_app;
/// let config = Config::default();
/// let db = init_db(&config.database_url).unwrap();
/// let pokeapi = PokeApi::from_config(&config).unwrap();
/// let state = AppState { db: Arc::new(db), pokeapi, config: Arc::new(config) };
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/pokemon/", get(list_pokemon))
        .route("/pokemon/{identifier}/", get(get_pokemon))
        .route("/favorites/", get(list_favorites).post(add_favorite))
        .route("/favorites/{id}/", delete(remove_favorite))
        .route("/team/", get(list_team))
        .route("/team/set/", post(set_team));

    let auth_routes = Router::new()
        .route("/register/", post(register))
        .route("/token/", post(obtain_token))
        .route("/token/refresh/", post(refresh_token))
        .route("/me/", get(me))
        .route("/password/change/", post(change_password))
        .route("/password-reset/", post(request_password_reset))
        .route("/password-reset/confirm/", post(confirm_password_reset))
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/{id}/",
            get(get_user).put(update_user).patch(update_user).delete(delete_user),
        )
        .route("/users/{id}/reset-password/", post(admin_reset_password));

    Router::new()
        .route("/", get(health))
        .route("/health/", get(health))
        .nest("/api", api_routes)
        .nest("/auth", auth_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
