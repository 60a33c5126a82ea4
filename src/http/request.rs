//! Request-side helpers.
//!
//! # Responsibilities
//! - Request id header name and lookup
//! - Bounded body read and JSON parse for REST endpoints

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use serde_json::Value;

use crate::http::response;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request id set by the request-id layer, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Read at most `limit` bytes and parse them as JSON. An empty body is `{}`.
pub async fn read_json_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Value, Response> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(response::payload_too_large());
    }

    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| response::payload_too_large())?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(&bytes).map_err(|_| response::invalid_json())
}
