//! Response builders.
//!
//! # Responsibilities
//! - JSON bodies for health, not-found and handler results
//! - Hide internal failures behind an error id
//!
//! # Design Decisions
//! - The not-found body is written field by field so its key order is fixed
//! - 5xx details go to the log (same error id), never to the client

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

/// JSON response with an explicit status.
pub fn json(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// `{"error": message}` with `status`.
pub fn error(status: StatusCode, message: &str) -> Response {
    json(status, json!({ "error": message }))
}

/// Liveness answer. Does not consult any handler.
pub fn health() -> Response {
    json(
        StatusCode::OK,
        json!({
            "status": "UP",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

pub fn not_found(method: &Method, path: &str) -> Response {
    let body = format!(
        r#"{{"error":"Route not found","path":{},"method":{}}}"#,
        Value::String(path.to_string()),
        Value::String(method.as_str().to_string()),
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn invalid_json() -> Response {
    error(StatusCode::BAD_REQUEST, "Invalid JSON body")
}

pub fn payload_too_large() -> Response {
    error(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
}

/// Log `detail` under a fresh error id and return the opaque 500.
pub fn internal_error(path: &str, detail: &str) -> Response {
    let error_id = Uuid::new_v4().to_string();
    tracing::error!(error_id = %error_id, path = %path, error = %detail, "Unhandled handler error");
    json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "error": "Internal Server Error",
            "errorId": error_id,
            "path": path,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}
