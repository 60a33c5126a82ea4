//! HTTP server and connection handling.
//!
//! # Responsibilities
//! - Own the accept loop (one task per connection)
//! - Terminate TLS when configured
//! - Classify each request before any byte of response is written
//! - Drop connections that request an upgrade outside the relay prefix
//! - Serve health, REST and relay through one Axum router with middleware
//! - Drain connections and sessions on shutdown
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → TlsTerminator::accept (optional)
//!     → hyper HTTP/1.1 connection (upgrades enabled)
//!     → RouteTable::classify
//!         Reject   → service error, hyper drops the connection
//!         otherwise → Dispatch in extensions → Axum router
//!     → gateway_handler → health | REST dispatcher | websocket::upgrade | 404
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::FutureExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::{RestDispatcher, RestRequest};
use crate::config::{Environment, GatewayConfig};
use crate::http::request::{read_json_body, request_id, X_REQUEST_ID};
use crate::http::{response, websocket};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError, TlsTerminator};
use crate::observability::metrics;
use crate::relay::target::TargetError;
use crate::relay::UpstreamConnector;
use crate::routing::{Dispatch, RejectReason, RestEndpoint, RouteTable};

/// Shared, read-only state for handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub dispatcher: Arc<dyn RestDispatcher>,
    pub connector: UpstreamConnector,
    pub shutdown: Shutdown,
    /// Live relay sessions.
    pub sessions: ConnectionTracker,
    pub close_timeout: Duration,
    pub max_body_size: usize,
}

/// Returned to hyper for rejected upgrades so the connection is dropped
/// without a response.
#[derive(Debug, Error)]
#[error("request rejected: {0}")]
pub struct Rejected(pub RejectReason);

/// The connection gateway.
pub struct GatewayServer {
    state: GatewayState,
    app: Router,
    tls: Option<TlsTerminator>,
    connections: ConnectionTracker,
    shutdown_grace: Duration,
}

impl GatewayServer {
    pub fn new(
        config: &GatewayConfig,
        dispatcher: Arc<dyn RestDispatcher>,
        tls: Option<TlsTerminator>,
        shutdown: Shutdown,
    ) -> Result<Self, TargetError> {
        let state = GatewayState {
            routes: Arc::new(RouteTable::from_config(config)?),
            dispatcher,
            connector: UpstreamConnector::new(Duration::from_secs(config.timeouts.connect_secs)),
            shutdown,
            sessions: ConnectionTracker::new(),
            close_timeout: Duration::from_millis(config.relay.close_timeout_ms),
            max_body_size: config.security.max_body_size,
        };

        for route in state.routes.routes() {
            tracing::debug!(route = route.name, pattern = ?route.pattern, methods = ?route.methods, "Route registered");
        }

        let app = build_router(config, state.clone());
        Ok(Self {
            state,
            app,
            tls,
            connections: ConnectionTracker::new(),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        })
    }

    /// The Axum router with all middleware. Classification falls back to
    /// the handler when requests arrive without the connection wrapper.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Accept and serve until shutdown, then drain.
    pub async fn run(self, listener: Listener) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            tls = self.tls.is_some(),
            "Gateway accepting connections"
        );

        let shutdown = self.state.shutdown.clone();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let conn = Connection {
                app: self.app.clone(),
                routes: self.state.routes.clone(),
                tls: self.tls.clone(),
                shutdown: shutdown.clone(),
                peer,
            };
            let guard = self.connections.track();
            tokio::spawn(async move {
                let _guard = guard;
                conn.serve(stream, permit).await;
            });
        }

        drop(listener);
        tracing::info!(
            connections = self.connections.active_count(),
            sessions = self.state.sessions.active_count(),
            "Listener closed, draining"
        );

        let drained = tokio::join!(
            self.connections.wait_idle(self.shutdown_grace),
            self.state.sessions.wait_idle(self.shutdown_grace),
        );
        if drained != (true, true) {
            tracing::warn!(
                connections = self.connections.active_count(),
                sessions = self.state.sessions.active_count(),
                "Shutdown grace period elapsed with work still running"
            );
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Everything one connection task needs.
struct Connection {
    app: Router,
    routes: Arc<RouteTable>,
    tls: Option<TlsTerminator>,
    shutdown: Shutdown,
    peer: SocketAddr,
}

impl Connection {
    async fn serve(self, stream: TcpStream, _permit: ConnectionPermit) {
        match self.tls.clone() {
            Some(tls) => match tls.accept(stream).await {
                Ok(secured) => self.serve_http(secured).await,
                Err(e) => {
                    metrics::record_tls_handshake_failure(e.kind());
                    tracing::warn!(peer_addr = %self.peer, kind = e.kind(), error = %e, "TLS handshake failed");
                }
            },
            None => self.serve_http(stream).await,
        }
    }

    async fn serve_http<I>(self, io: I)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Connection {
            app,
            routes,
            shutdown,
            peer,
            ..
        } = self;

        let service = service_fn(move |req: Request<Incoming>| {
            let app = app.clone();
            let routes = routes.clone();
            async move { route_request(app, &routes, peer, req).await }
        });

        // HTTP/1.1 only: a rejected upgrade must take the whole connection
        // down, and the relay upgrade itself does not exist over HTTP/2.
        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(io), service)
            .with_upgrades();
        tokio::pin!(conn);

        let finished = tokio::select! {
            result = conn.as_mut() => Some(result),
            _ = shutdown.wait() => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };
        if let Err(e) = result {
            tracing::debug!(peer_addr = %peer, error = %e, "Connection ended with error");
        }
    }
}

/// Classify, then either drop the connection or hand the request to Axum.
async fn route_request(
    app: Router,
    routes: &RouteTable,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response, Rejected> {
    let dispatch = routes.classify(&req);
    if let Dispatch::Reject(reason) = dispatch {
        metrics::record_rejected_upgrade();
        tracing::info!(
            peer_addr = %peer,
            path = %req.uri().path(),
            reason = %reason,
            "Dropping connection"
        );
        return Err(Rejected(reason));
    }

    let mut req = req.map(Body::new);
    req.extensions_mut().insert(dispatch);
    req.extensions_mut().insert(ConnectInfo(peer));
    Ok(app
        .oneshot(req)
        .await
        .unwrap_or_else(|never: Infallible| match never {}))
}

#[allow(deprecated)]
fn build_router(config: &GatewayConfig, state: GatewayState) -> Router {
    let cors = match config.environment {
        Environment::Development => CorsLayer::new().allow_origin(Any),
        Environment::Production => CorsLayer::new().allow_origin(AllowOrigin::list(
            config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )),
    }
    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
    .allow_headers([CONTENT_TYPE]);

    Router::new()
        .fallback(gateway_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %request_id(req.headers()),
                    )
                }))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(cors)
                .layer(SetResponseHeaderLayer::if_not_present(
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, POST, OPTIONS"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type"),
                ))
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
        )
}

/// Single entry point for every request that reached Axum.
async fn gateway_handler(State(state): State<GatewayState>, mut req: Request) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let dispatch = match req.extensions_mut().remove::<Dispatch>() {
        Some(dispatch) => dispatch,
        None => state.routes.classify(&req),
    };
    let label = dispatch.label();

    let response = match dispatch {
        Dispatch::Relay(target) => websocket::upgrade(state.clone(), target, req).await,
        Dispatch::Health => response::health(),
        Dispatch::Rest(endpoint) => rest(&state, endpoint, req).await,
        Dispatch::NotFound => {
            tracing::debug!(method = %method, path = %path, "No route matched");
            response::not_found(&method, &path)
        }
        Dispatch::Reject(reason) => {
            // Only reachable without the connection wrapper, which drops these first.
            metrics::record_rejected_upgrade();
            tracing::info!(path = %path, reason = %reason, "Rejected upgrade");
            axum::http::StatusCode::BAD_REQUEST.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), label, start);
    response
}

async fn rest(state: &GatewayState, endpoint: RestEndpoint, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    let body = match read_json_body(&parts.headers, body, state.max_body_size).await {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let request = RestRequest {
        method: parts.method,
        path: path.clone(),
        body,
    };
    let outcome = AssertUnwindSafe(state.dispatcher.dispatch(endpoint, request))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(resp)) => response::json(resp.status, resp.body),
        Ok(Err(e)) if e.is_client_error() => response::error(e.status(), &e.to_string()),
        Ok(Err(e)) => response::internal_error(&path, &e.to_string()),
        Err(panic) => response::internal_error(&path, &format!("handler panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
