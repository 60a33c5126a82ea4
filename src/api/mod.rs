//! REST endpoint handlers.
//!
//! # Data Flow
//! ```text
//! http::server (body read, JSON parse, error mapping)
//!     → RestDispatcher::dispatch(endpoint, RestRequest)
//!     → GatewayDispatcher
//!         → token.rs (generate / validate / zego)
//!         → translate.rs (Xunfei ITS)
//!     → RestResponse | HandlerError
//! ```
//!
//! # Design Decisions
//! - Handlers never build HTTP responses; the gateway owns status mapping
//! - Client-caused failures carry their message; server failures do not leak

pub mod token;
pub mod translate;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::routing::RestEndpoint;

pub use token::{HmacTokenIssuer, TokenClaims, TokenError, TokenIssuer, TokenRequest};
pub use translate::{TranslateError, Translator, XunfeiTranslator};

/// Longest lifetime a caller may request for a token: 30 days.
pub const MAX_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// A parsed REST request.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    /// Parsed JSON body; `{}` when the body was empty.
    pub body: Value,
}

/// A handler result, serialized as JSON by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl RestResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }
}

/// Handler failure.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HandlerError::Upstream(_) | HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may be shown to the caller.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

/// Pluggable REST backend.
#[async_trait]
pub trait RestDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: RestEndpoint, request: RestRequest) -> Result<RestResponse, HandlerError>;
}

/// The gateway's own REST handlers.
pub struct GatewayDispatcher {
    tokens: Arc<dyn TokenIssuer>,
    zego: Arc<dyn TokenIssuer>,
    translator: Option<Arc<dyn Translator>>,
}

impl GatewayDispatcher {
    pub fn new(
        tokens: Arc<dyn TokenIssuer>,
        zego: Arc<dyn TokenIssuer>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        Self {
            tokens,
            zego,
            translator,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, TranslateError> {
        let ttl = Duration::from_secs(config.tokens.expire_secs);
        let tokens = HmacTokenIssuer::new(&config.tokens.app_id, &config.tokens.app_certificate, ttl);
        let zego = HmacTokenIssuer::new(&config.tokens.zego_app_id, &config.tokens.zego_server_secret, ttl);

        let translator: Option<Arc<dyn Translator>> = if config.translate.enabled {
            Some(Arc::new(XunfeiTranslator::new(
                &config.translate,
                Duration::from_secs(config.timeouts.connect_secs),
            )?))
        } else {
            None
        };

        Ok(Self::new(Arc::new(tokens), Arc::new(zego), translator))
    }

    fn generate(&self, body: &Value) -> Result<RestResponse, HandlerError> {
        let (Some(uid), Some(channel)) = (required(body, "uid"), required(body, "channelName")) else {
            return Err(HandlerError::BadRequest("UID and channelName are required".into()));
        };
        let role = match body.get("role").and_then(Value::as_str) {
            None => token::ROLE_PUBLISHER,
            Some(r) if r.eq_ignore_ascii_case(token::ROLE_PUBLISHER) => token::ROLE_PUBLISHER,
            Some(r) if r.eq_ignore_ascii_case(token::ROLE_SUBSCRIBER) => token::ROLE_SUBSCRIBER,
            Some(_) => {
                return Err(HandlerError::BadRequest("role must be publisher or subscriber".into()));
            }
        };

        let token = self
            .tokens
            .issue(&TokenRequest {
                subject: uid,
                channel: Some(channel),
                role: role.to_string(),
                ttl: self.tokens.default_ttl(),
            })
            .map_err(|e| HandlerError::Internal(format!("Failed to generate token: {e}")))?;
        Ok(RestResponse::ok(json!({ "token": token })))
    }

    fn validate(&self, body: &Value) -> Result<RestResponse, HandlerError> {
        let Some(token) = required(body, "token") else {
            return Err(HandlerError::BadRequest("Token is required".into()));
        };
        match self.tokens.verify(&token) {
            Ok(claims) => Ok(RestResponse::ok(json!({ "decodedToken": claims }))),
            Err(TokenError::NotConfigured) => Err(HandlerError::Internal("token issuer is not configured".into())),
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                Err(HandlerError::Unauthorized("Token verification failed".into()))
            }
        }
    }

    fn zego_token(&self, body: &Value) -> Result<RestResponse, HandlerError> {
        let Some(user_id) = required(body, "userId") else {
            return Err(HandlerError::BadRequest("userId is required".into()));
        };
        let ttl = match body.get("effectiveTimeInSeconds") {
            None | Some(Value::Null) => self.zego.default_ttl(),
            Some(v) => match v.as_u64() {
                Some(secs) if secs > 0 && secs <= MAX_TOKEN_TTL_SECS => Duration::from_secs(secs),
                _ => {
                    return Err(HandlerError::BadRequest(format!(
                        "effectiveTimeInSeconds must be between 1 and {MAX_TOKEN_TTL_SECS}"
                    )));
                }
            },
        };

        let token = self
            .zego
            .issue(&TokenRequest {
                subject: user_id,
                channel: None,
                role: token::ROLE_PUBLISHER.to_string(),
                ttl,
            })
            .map_err(|e| HandlerError::Internal(format!("Failed to generate token: {e}")))?;
        Ok(RestResponse::ok(json!({ "token": token })))
    }

    async fn translate(&self, body: &Value) -> Result<RestResponse, HandlerError> {
        let Some(text) = required(body, "text") else {
            return Err(HandlerError::BadRequest("text is required".into()));
        };
        let from = body.get("from").and_then(Value::as_str).unwrap_or("cn");
        let to = body.get("to").and_then(Value::as_str).unwrap_or("en");

        let translator = self
            .translator
            .as_ref()
            .ok_or_else(|| HandlerError::Internal("translation is not configured".into()))?;
        let result = translator
            .translate(&text, from, to)
            .await
            .map_err(|e| HandlerError::Upstream(e.to_string()))?;
        Ok(RestResponse::ok(json!({ "result": result })))
    }
}

#[async_trait]
impl RestDispatcher for GatewayDispatcher {
    async fn dispatch(&self, endpoint: RestEndpoint, request: RestRequest) -> Result<RestResponse, HandlerError> {
        match endpoint {
            RestEndpoint::GenerateToken => self.generate(&request.body),
            RestEndpoint::ValidateToken => self.validate(&request.body),
            RestEndpoint::ZegoToken => self.zego_token(&request.body),
            RestEndpoint::Translate => self.translate(&request.body).await,
        }
    }
}

/// A present, non-empty string or non-zero number field, as a string.
fn required(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}
