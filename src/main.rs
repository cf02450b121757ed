//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and the catalog client
//! - Starts the HTTP server with graceful shutdown support

use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pokedex::account::bootstrap_superuser;
use pokedex::catalog::PokeApi;
use pokedex::config::Config;
use pokedex::database::{init_db, AppState};
use pokedex::route::create_app;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pokedex=debug,tower_http=debug"));

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Application entry point
///
/// 1. Loads environment variables from .env file
/// 2. Reads [`Config`] from the environment
/// 3. Initializes the embedded database and the catalog client
/// 4. Creates the initial superuser when `ADMIN_USERNAME` and `ADMIN_PASSWORD` are set
/// 5. Starts the HTTP server with graceful shutdown handling
#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env();

    let db = init_db(&config.database_url).expect("Failed to initialize database");
    let pokeapi = PokeApi::from_config(&config).expect("Failed to build catalog client");

    if let (Ok(username), Ok(password)) = (env::var("ADMIN_USERNAME"), env::var("ADMIN_PASSWORD")) {
        match bootstrap_superuser(&db, &username, env::var("ADMIN_EMAIL").ok(), &password).await {
            Ok(true) => info!(event = "admin.bootstrap", username = %username, "superuser created"),
            Ok(false) => info!(event = "admin.bootstrap", username = %username, "superuser already exists"),
            Err(err) => error!(event = "admin.bootstrap", error = %err, "failed to create superuser"),
        }
    }

    let port = config.port;
    let database_url = config.database_url.clone();
    let state = AppState {
        db: Arc::new(db),
        pokeapi,
        config: Arc::new(config),
    };

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind address");

    info!(port, database = %database_url, "server running at http://localhost:{}", port);

    // Runs until SIGTERM or SIGINT; in-flight requests are allowed to finish
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
