//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check the relay target is a WebSocket URL
//! - Enforce production-only requirements (CORS allow-list)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::schema::{Environment, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.listener.handshake_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.handshake_timeout_secs", "must be greater than 0"));
    }

    if config.relay.enabled {
        let prefix = &config.relay.prefix;
        if !prefix.starts_with('/') || prefix == "/" || prefix.ends_with('/') {
            errors.push(ValidationError::new(
                "relay.prefix",
                "must start with '/', must not end with '/' and must not be the root path",
            ));
        }
        match Url::parse(&config.relay.upstream_base_url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError::new(
                "relay.upstream_base_url",
                format!("scheme '{}' is not ws or wss", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("relay.upstream_base_url", e.to_string())),
        }
        if HeaderValue::from_str(&config.relay.origin).is_err() {
            errors.push(ValidationError::new("relay.origin", "is not a valid header value"));
        }
        if config.relay.close_timeout_ms == 0 {
            errors.push(ValidationError::new("relay.close_timeout_ms", "must be greater than 0"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.environment == Environment::Production {
        let origins = &config.cors.allowed_origins;
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            errors.push(ValidationError::new(
                "cors.allowed_origins",
                "production requires an explicit allow-list without '*'",
            ));
        }
    }
    for origin in &config.cors.allowed_origins {
        if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.allowed_origins",
                format!("'{}' is not a valid header value", origin),
            ));
        }
    }

    if config.translate.enabled {
        let t = &config.translate;
        if t.app_id.is_empty() || t.api_key.is_empty() || t.api_secret.is_empty() {
            errors.push(ValidationError::new(
                "translate",
                "app_id, api_key and api_secret are required when enabled",
            ));
        }
        if Url::parse(&t.endpoint).is_err() {
            errors.push(ValidationError::new("translate.endpoint", "is not a valid URL"));
        }
    }

    if config.alerts.enabled {
        match config.alerts.webhook_url.as_deref().map(Url::parse) {
            Some(Ok(_)) => {}
            Some(Err(e)) => errors.push(ValidationError::new("alerts.webhook_url", e.to_string())),
            None => errors.push(ValidationError::new("alerts.webhook_url", "required when alerts are enabled")),
        }
        if config.alerts.queue_capacity == 0 {
            errors.push(ValidationError::new("alerts.queue_capacity", "must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
