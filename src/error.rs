//! API error type and its HTTP rendering
//!
//! Handlers return [`ApiResult`]; every failure becomes a JSON body with the
//! matching status code. Upstream and storage failures are logged here so
//! handlers can simply propagate them with `?`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::catalog::CatalogError;
use crate::database::StoreError;
use crate::model::DetailResponse;
use crate::validation::ValidationErrors;

pub const NOT_FOUND: &str = "Not found.";
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(err: argon2::password_hash::Error) -> Self {
        ApiError::Internal(format!("password hashing failed: {}", err))
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(DetailResponse::new(message))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::BadRequest(message) => detail(StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => detail(StatusCode::UNAUTHORIZED, message),
            ApiError::Forbidden => detail(StatusCode::FORBIDDEN, PERMISSION_DENIED),
            ApiError::NotFound => detail(StatusCode::NOT_FOUND, NOT_FOUND),
            ApiError::Catalog(err @ CatalogError::InvalidGeneration(_)) => {
                detail(StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Catalog(err) => {
                error!(event = "catalog.error", error = %err, "catalog request failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Store(err) => {
                error!(event = "store.error", error = %err, "storage operation failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
            ApiError::Token(err) => {
                error!(event = "token.error", error = %err, "token encoding failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
            ApiError::Internal(message) => {
                error!(event = "internal.error", error = %message, "internal error");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_render_field_map() {
        let (status, body) = render(ValidationErrors::field("pokemon_id", "bad").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"pokemon_id": ["bad"]}));
    }

    #[tokio::test]
    async fn invalid_generation_is_a_client_error() {
        let (status, body) = render(CatalogError::InvalidGeneration("abc".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("abc"));
    }

    #[tokio::test]
    async fn upstream_failure_is_a_server_error() {
        let err = CatalogError::Status {
            url: "https://pokeapi.co/api/v2/pokemon/1/".into(),
            status: 503,
        };
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn auth_errors_use_detail_body() {
        assert_eq!(render(ApiError::NotFound).await, (StatusCode::NOT_FOUND, json!({"detail": NOT_FOUND})));
        assert_eq!(
            render(ApiError::Forbidden).await,
            (StatusCode::FORBIDDEN, json!({"detail": PERMISSION_DENIED}))
        );
        assert_eq!(render(ApiError::Unauthorized("nope".into())).await.0, StatusCode::UNAUTHORIZED);
    }
}
