//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Classify each request exactly once: relay, health, REST, not found or reject
//! - Build the relay target for relay requests
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Single ordered pass; the first matching route wins
//! - Explicit NotFound / Reject rather than silent default
//! - Upgrade requests never fall through to REST handling

use axum::http::{Method, Request};
use std::fmt;

use crate::config::GatewayConfig;
use crate::relay::target::{RelayTarget, RelayTargetBuilder, TargetError};
use crate::routing::matcher::{is_websocket_upgrade, method_allowed, PathPattern};

/// REST endpoints served through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestEndpoint {
    GenerateToken,
    ValidateToken,
    ZegoToken,
    Translate,
}

impl RestEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestEndpoint::GenerateToken => "token_generate",
            RestEndpoint::ValidateToken => "token_validate",
            RestEndpoint::ZegoToken => "token_zego",
            RestEndpoint::Translate => "translate",
        }
    }
}

/// What a matched route does.
#[derive(Debug, Clone)]
pub enum RouteKind {
    Health,
    Rest(RestEndpoint),
    WebSocketRelay(RelayTargetBuilder),
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Route identifier for logging/metrics.
    pub name: &'static str,
    pub pattern: PathPattern,
    /// Allowed methods; empty means any.
    pub methods: Vec<Method>,
    pub kind: RouteKind,
}

/// Why a request was refused without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Upgrade requested on a path that is not the relay prefix.
    UpgradeOutsideRelay,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UpgradeOutsideRelay => write!(f, "websocket upgrade outside relay prefix"),
        }
    }
}

/// Classification result for one request.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Relay(RelayTarget),
    Health,
    Rest(RestEndpoint),
    NotFound,
    Reject(RejectReason),
}

impl Dispatch {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::Relay(_) => "relay",
            Dispatch::Health => "health",
            Dispatch::Rest(endpoint) => endpoint.as_str(),
            Dispatch::NotFound => "none",
            Dispatch::Reject(_) => "rejected",
        }
    }
}

/// Immutable, ordered route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create a table from explicit routes (evaluated in order).
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Compile the gateway's routes from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, TargetError> {
        let mut routes = Vec::new();

        if config.relay.enabled {
            routes.push(Route {
                name: "relay",
                pattern: PathPattern::Prefix(config.relay.prefix.clone()),
                methods: vec![Method::GET],
                kind: RouteKind::WebSocketRelay(RelayTargetBuilder::new(
                    &config.relay.upstream_base_url,
                    &config.relay.origin,
                )?),
            });
        }

        routes.push(Route {
            name: "health",
            pattern: PathPattern::Exact("/health".into()),
            methods: vec![Method::GET],
            kind: RouteKind::Health,
        });

        let mut rest = vec![
            ("/api/token/generate", RestEndpoint::GenerateToken),
            ("/api/token/validate", RestEndpoint::ValidateToken),
            ("/api/token/zegoGenerateToken", RestEndpoint::ZegoToken),
        ];
        if config.translate.enabled {
            rest.push(("/api/token/xunfeiTranslate", RestEndpoint::Translate));
        }
        routes.extend(rest.into_iter().map(|(path, endpoint)| Route {
            name: endpoint.as_str(),
            pattern: PathPattern::Exact(path.into()),
            methods: vec![Method::POST],
            kind: RouteKind::Rest(endpoint),
        }));

        Ok(Self::new(routes))
    }

    /// Classify a request from its head. The body is never touched.
    pub fn classify<B>(&self, req: &Request<B>) -> Dispatch {
        let path = req.uri().path();
        let upgrade = is_websocket_upgrade(req.headers());

        for route in &self.routes {
            let Some(rest) = route.pattern.strip(path) else {
                continue;
            };
            match &route.kind {
                RouteKind::WebSocketRelay(builder) if upgrade => {
                    return Dispatch::Relay(builder.build(rest, req.uri().query()));
                }
                RouteKind::WebSocketRelay(_) => continue,
                _ if upgrade => continue,
                RouteKind::Health if method_allowed(&route.methods, req.method()) => {
                    return Dispatch::Health;
                }
                RouteKind::Rest(endpoint) if method_allowed(&route.methods, req.method()) => {
                    return Dispatch::Rest(*endpoint);
                }
                _ => continue,
            }
        }

        if upgrade {
            Dispatch::Reject(RejectReason::UpgradeOutsideRelay)
        } else {
            Dispatch::NotFound
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
