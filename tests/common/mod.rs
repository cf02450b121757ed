//! Shared test fixtures: a stub catalog server and an application wired to it

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use pokedex::catalog::cache::MemoryCache;
use pokedex::catalog::client::{CatalogClient, RetryPolicy};
use pokedex::catalog::PokeApi;
use pokedex::config::Config;
use pokedex::database::{init_db, AppState};
use pokedex::route::create_app;

/// `(id, name, types)` of every Pokémon the stub knows
pub const POKEMON: &[(u32, &str, &[&str])] = &[
    (1, "bulbasaur", &["grass", "poison"]),
    (2, "ivysaur", &["grass", "poison"]),
    (3, "venusaur", &["grass", "poison"]),
    (4, "charmander", &["fire"]),
    (5, "charmeleon", &["fire"]),
    (6, "charizard", &["fire", "flying"]),
    (7, "squirtle", &["water"]),
    (25, "pikachu", &["electric"]),
    (152, "chikorita", &["grass"]),
];

/// Id whose detail endpoint always fails with a 500
pub const BROKEN_POKEMON_ID: u32 = 13;

/// Per-path hit counters of the stub catalog
#[derive(Clone, Default)]
pub struct Upstream {
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Upstream {
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    fn record(&self, path: &str) -> usize {
        let mut hits = self.hits.lock().unwrap();
        let count = hits.entry(path.to_string()).or_default();
        *count += 1;
        *count
    }
}

fn resource(kind: &str, id: u32, name: &str) -> Value {
    json!({
        "name": name,
        "url": format!("https://pokeapi.co/api/v2/{}/{}/", kind, id),
    })
}

fn detail(id: u32, name: &str, types: &[&str]) -> Value {
    let types: Vec<Value> = types
        .iter()
        .enumerate()
        .map(|(index, type_name)| json!({ "slot": index + 1, "type": { "name": type_name } }))
        .collect();
    json!({
        "id": id,
        "name": name,
        "sprites": {
            "front_default": format!("https://img.example/{}.png", id),
            "other": { "official-artwork": { "front_default": format!("https://art.example/{}.png", id) } }
        },
        "types": types,
        "stats": [
            { "base_stat": 45, "stat": { "name": "hp" } },
            { "base_stat": 49, "stat": { "name": "attack" } },
            { "base_stat": 80, "stat": { "name": "defense" } },
            { "base_stat": 65, "stat": { "name": "speed" } }
        ]
    })
}

fn query_param(uri: &Uri, key: &str) -> Option<usize> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .and_then(|(_, value)| value.parse().ok())
}

async fn stub_handler(State(upstream): State<Upstream>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let hit = upstream.record(&path);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["flaky"] if hit == 1 => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        ["flaky"] => Json(json!({ "ok": true, "hit": hit })).into_response(),
        ["unavailable"] => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        ["rate-limited"] if hit == 1 => {
            (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")]).into_response()
        }
        ["rate-limited"] => Json(json!({ "ok": true })).into_response(),
        ["broken"] => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        ["pokemon"] => {
            let limit = query_param(&uri, "limit").unwrap_or(20);
            let offset = query_param(&uri, "offset").unwrap_or(0);
            let results: Vec<Value> = POKEMON
                .iter()
                .skip(offset)
                .take(limit)
                .map(|(id, name, _)| resource("pokemon", *id, name))
                .collect();
            Json(json!({ "count": POKEMON.len(), "results": results })).into_response()
        }
        ["pokemon", identifier] => {
            if *identifier == BROKEN_POKEMON_ID.to_string() {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            match POKEMON
                .iter()
                .find(|(id, name, _)| id.to_string() == *identifier || name == identifier)
            {
                Some((id, name, types)) => Json(detail(*id, name, types)).into_response(),
                None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            }
        }
        ["generation", "1"] => {
            let species: Vec<Value> = POKEMON
                .iter()
                .filter(|(id, _, _)| *id <= 151)
                .rev()
                .map(|(id, name, _)| resource("pokemon-species", *id, name))
                .collect();
            Json(json!({ "id": 1, "pokemon_species": species })).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Starts the stub catalog on an ephemeral port; returns its base URL.
pub async fn start_upstream() -> (String, Upstream) {
    let upstream = Upstream::default();
    let app = Router::new()
        .fallback(stub_handler)
        .with_state(upstream.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), upstream)
}

/// Raw TCP upstream that closes its first `drop_first` connections without
/// answering, then serves `{"ok":true}` to every request. Returns the base URL
/// and the number of connections accepted so far.
pub async fn start_dropping_upstream(drop_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let accepted = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            if accepted.fetch_add(1, Ordering::SeqCst) < drop_first {
                drop(socket);
                continue;
            }
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let body = r#"{"ok":true}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (format!("http://{}", addr), connections)
}

/// Catalog client against `base_url` that retries without sleeping
pub fn test_pokeapi(base_url: &str) -> PokeApi {
    let client = CatalogClient::new(base_url, Duration::from_secs(5), RetryPolicy::immediate())
        .expect("Failed to build catalog client");
    PokeApi::new(client, Arc::new(MemoryCache::new()), Duration::from_secs(60))
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub upstream: Upstream,
    _temp_db: NamedTempFile,
}

/// Full application backed by a temporary database and the stub catalog
pub async fn setup_test_app() -> TestApp {
    let (base_url, upstream) = start_upstream().await;

    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db = init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database");

    let config = Config {
        pokeapi_base_url: base_url.clone(),
        jwt_secret: "test-secret".to_string(),
        ..Config::default()
    };
    let state = AppState {
        db: Arc::new(db),
        pokeapi: test_pokeapi(&base_url),
        config: Arc::new(config),
    };

    TestApp {
        app: create_app(state.clone()),
        state,
        upstream,
        _temp_db: temp_db,
    }
}

impl TestApp {
    /// Sends a request and returns status and JSON body (`Null` when empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, response_json(response.into_body()).await)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("DELETE", uri, token, None).await
    }

    /// Registers `username` and returns an access token for it.
    pub async fn register_and_login(&self, username: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register/",
                None,
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                    "password_confirm": PASSWORD,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        self.login(username, PASSWORD).await
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post("/auth/token/", None, json!({ "username": username, "password": password }))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access"].as_str().unwrap().to_string()
    }
}

pub const PASSWORD: &str = "Gotta-Catch-3m-All";

/// Helper function to parse response body as JSON
pub async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Failed to parse JSON")
    }
}
