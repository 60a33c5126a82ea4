//! WebSocket relay entry point.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the client
//! - Dial the upstream once the client is upgraded
//! - Create a [`Session`] for both legs, or close the client with 1011
//!
//! # Data Flow
//! ```text
//! Client ──upgrade──→ Gateway (101) ──dial──→ Upstream
//!                        │
//!            dial failed: Close 1011 "upstream unavailable"
//!            dial ok:     Session::new, then relay(client, upstream)
//! ```

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::response::{IntoResponse, Response};
use futures_util::SinkExt;

use crate::http::server::GatewayState;
use crate::observability::metrics;
use crate::relay::{client_connection, upstream_connection, RelayTarget, Session};

/// Close reason sent to the client when the upstream cannot be reached.
pub const UPSTREAM_UNAVAILABLE: &str = "upstream unavailable";

/// Upgrade the client and start a relay session towards `target`.
pub async fn upgrade(state: GatewayState, target: RelayTarget, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed WebSocket handshake");
            return rejection.into_response();
        }
    };

    tracing::info!(upstream = %target.url, "Relay requested");

    let guard = state.sessions.track();
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "Client upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            run_session(state, socket, target).await;
        })
}

/// Dial the upstream for an upgraded client. The session exists only once
/// both handshakes are done, so a failed dial is an upstream failure, not a
/// session outcome.
async fn run_session(state: GatewayState, mut socket: WebSocket, target: RelayTarget) {
    let shutdown = state.shutdown.token();
    let dialed = tokio::select! {
        dialed = state.connector.connect(&target) => dialed,
        _ = shutdown.cancelled() => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    match dialed {
        Ok(upstream) => {
            let session = Session::new(shutdown, state.close_timeout);
            session
                .relay(client_connection(socket), upstream_connection(upstream))
                .await;
        }
        Err(e) => {
            metrics::record_upstream_failure(e.kind());
            tracing::warn!(
                upstream = %target.url,
                kind = e.kind(),
                error = %e,
                "Upstream unavailable"
            );

            let close = Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: UPSTREAM_UNAVAILABLE.into(),
            }));
            let _ = tokio::time::timeout(state.close_timeout, socket.send(close)).await;
        }
    }
}
