//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! Client ←── frames ──→ Session ←── frames ──→ Upstream
//!                          │
//!            client→upstream loop   upstream→client loop
//!                          │
//!            shared CancellationToken + atomic close flag
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding, one in-flight message per direction
//! - Text/binary framing and payload bytes are preserved
//! - Ping/pong answered per leg, not forwarded
//! - Close propagated in both directions, executed once per session

pub mod frame;
pub mod session;
pub mod target;
pub mod upstream;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures_util::future::{self, Ready};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::WebSocketStream;

pub use frame::{CloseReason, Frame};
pub use session::{CloseCause, Direction, Session, SessionId, SessionState, Side};
pub use target::{RelayTarget, RelayTargetBuilder};
pub use upstream::{UpstreamConnector, UpstreamError};

/// I/O failure on one leg of an open session.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("client connection error: {0}")]
    Client(#[from] axum::Error),
    #[error("upstream connection error: {0}")]
    Upstream(#[from] tungstenite::Error),
}

impl RelayError {
    /// Which leg produced the error.
    pub fn side(&self) -> Side {
        match self {
            RelayError::Client(_) => Side::Client,
            RelayError::Upstream(_) => Side::Upstream,
        }
    }
}

/// Adapt the upgraded client socket to the relay frame model.
pub fn client_connection(
    socket: WebSocket,
) -> impl Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Send + Unpin {
    socket
        .with(|frame: Frame| -> Ready<Result<ClientMessage, RelayError>> {
            future::ready(Ok(ClientMessage::from(frame)))
        })
        .map(|item| item.map(Frame::from).map_err(RelayError::from))
}

/// Adapt a tungstenite stream (the upstream leg, or any raw WebSocket) to the relay frame model.
pub fn upstream_connection<S>(
    ws: WebSocketStream<S>,
) -> impl Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Send + Unpin
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    ws.with(|frame: Frame| -> Ready<Result<UpstreamMessage, RelayError>> {
        future::ready(Ok(UpstreamMessage::from(frame)))
    })
    .filter_map(|item| {
        future::ready(match item {
            Ok(msg) => Frame::from_upstream(msg).map(Ok),
            Err(e) => Some(Err(RelayError::from(e))),
        })
    })
}
