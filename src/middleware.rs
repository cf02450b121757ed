use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use rand::{distr::Alphanumeric, Rng};
use tracing::{info, info_span, Instrument};

/// Header carrying the request id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Request id stored in the request extensions
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

fn generate_request_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Middleware that tags every request with a request id
///
/// An incoming `X-Request-ID` header is reused when present and reasonable;
/// otherwise a random id is generated. The id is stored as a [`RequestId`]
/// extension, echoed in the response header, and attached to a tracing span
/// so every log line emitted while handling the request carries it.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LENGTH)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        info!(event = "request.received", "request received");
        let mut response = next.run(request).await;
        info!(
            event = "request.completed",
            status_code = response.status().as_u16(),
            "request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
