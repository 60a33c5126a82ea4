//! Relay session state machine and forwarding loops.
//!
//! # Responsibilities
//! - Pair one client connection with one upstream connection
//! - Run one forwarding loop per direction
//! - Execute the close sequence exactly once, whoever triggers it
//!
//! # States
//! ```text
//! Connecting → Open → Closing → Closed
//!      └────────┴────────┴──────→ Closed   (fatal error)
//! ```
//!
//! # Design Decisions
//! - Both loops share one CancellationToken; the first loop to stop cancels the other
//! - `begin_close` is guarded by a single atomic flag (idempotent, lock-free)
//! - Close-and-drain is bounded by the configured close timeout
//! - Session tokens are children of the server shutdown token

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::observability::metrics;
use crate::relay::frame::Frame;
use crate::relay::RelayError;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0.simple())
    }
}

/// Session lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(val: u8) -> Self {
        match val {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// One leg of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Upstream => "upstream",
        }
    }
}

/// Forwarding direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    /// The leg this direction reads from.
    pub fn source(&self) -> Side {
        match self {
            Direction::ClientToUpstream => Side::Client,
            Direction::UpstreamToClient => Side::Upstream,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }

    fn index(&self) -> usize {
        match self {
            Direction::ClientToUpstream => 0,
            Direction::UpstreamToClient => 1,
        }
    }
}

/// Why a session ended. Recorded once, by whoever started the close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The leg sent a Close frame or ended its stream.
    Closed(Side),
    /// The leg failed with an I/O or protocol error.
    Failed(Side, String),
    /// Server shutdown.
    Shutdown,
}

impl CloseCause {
    pub fn label(&self) -> &'static str {
        match self {
            CloseCause::Closed(Side::Client) => "client_closed",
            CloseCause::Closed(Side::Upstream) => "upstream_closed",
            CloseCause::Failed(Side::Client, _) => "client_error",
            CloseCause::Failed(Side::Upstream, _) => "upstream_error",
            CloseCause::Shutdown => "shutdown",
        }
    }
}

impl From<&RelayError> for CloseCause {
    fn from(e: &RelayError) -> Self {
        CloseCause::Failed(e.side(), e.to_string())
    }
}

/// A client/upstream pairing.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: Instant,
    state: AtomicU8,
    closing: AtomicBool,
    cause: OnceLock<CloseCause>,
    cancel: CancellationToken,
    close_timeout: Duration,
    forwarded: [AtomicU64; 2],
}

impl Session {
    /// Create a session in `Connecting`. Cancelling `parent` closes it.
    pub fn new(parent: &CancellationToken, close_timeout: Duration) -> Self {
        Self {
            id: SessionId::new(),
            created_at: Instant::now(),
            state: AtomicU8::new(SessionState::Connecting as u8),
            closing: AtomicBool::new(false),
            cause: OnceLock::new(),
            cancel: parent.child_token(),
            close_timeout,
            forwarded: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The recorded close cause, once a close has started.
    pub fn cause(&self) -> Option<&CloseCause> {
        self.cause.get()
    }

    /// Messages forwarded in `direction` so far.
    pub fn forwarded(&self, direction: Direction) -> u64 {
        self.forwarded[direction.index()].load(Ordering::Relaxed)
    }

    /// Resolves once the session starts closing.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Connecting → Open. Returns false if the session already left Connecting.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Start the close sequence. Only the first caller gets `true`.
    pub fn begin_close(&self, cause: CloseCause) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.cause.set(cause);
        self.state.store(SessionState::Closing as u8, Ordering::Release);
        self.cancel.cancel();
        true
    }

    /// Move straight to `Closed` after a fatal error.
    pub fn fail(&self, cause: CloseCause) -> bool {
        let first = !self.closing.swap(true, Ordering::AcqRel);
        if first {
            let _ = self.cause.set(cause);
        }
        self.state.store(SessionState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
        first
    }

    /// Relay frames between `client` and `upstream` until either side ends,
    /// then close and drain both. Returns the close cause.
    pub async fn relay<C, U>(&self, client: C, upstream: U) -> CloseCause
    where
        C: Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Unpin,
        U: Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Unpin,
    {
        if !self.mark_open() {
            // Closed before relaying started.
            self.begin_close(CloseCause::Shutdown);
        }
        metrics::session_opened();
        tracing::info!(session_id = %self.id, "Relay session open");

        let (client_tx, client_rx) = client.split();
        let (upstream_tx, upstream_rx) = upstream.split();

        let ((client_rx, upstream_tx), (upstream_rx, client_tx)) = tokio::join!(
            self.pump(Direction::ClientToUpstream, client_rx, upstream_tx),
            self.pump(Direction::UpstreamToClient, upstream_rx, client_tx),
        );

        // Cancellation from outside (server shutdown) leaves no cause yet.
        self.begin_close(CloseCause::Shutdown);

        let drain = async {
            tokio::join!(
                close_and_drain(upstream_tx, upstream_rx),
                close_and_drain(client_tx, client_rx),
            )
        };
        if tokio::time::timeout(self.close_timeout, drain).await.is_err() {
            tracing::debug!(session_id = %self.id, "Close handshake timed out");
        }

        self.state.store(SessionState::Closed as u8, Ordering::Release);
        let cause = self.cause.get().cloned().unwrap_or(CloseCause::Shutdown);

        metrics::session_closed();
        metrics::record_session_outcome(cause.label(), self.created_at.elapsed());
        tracing::info!(
            session_id = %self.id,
            cause = cause.label(),
            client_to_upstream = self.forwarded(Direction::ClientToUpstream),
            upstream_to_client = self.forwarded(Direction::UpstreamToClient),
            duration_ms = self.created_at.elapsed().as_millis() as u64,
            "Relay session closed"
        );
        cause
    }

    /// Forward frames from `rx` to `tx` until close, error or cancellation.
    async fn pump<R, W>(&self, direction: Direction, mut rx: R, mut tx: W) -> (R, W)
    where
        R: Stream<Item = Result<Frame, RelayError>> + Unpin,
        W: Sink<Frame, Error = RelayError> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = rx.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    tracing::debug!(session_id = %self.id, direction = direction.as_str(), error = %e, "Receive failed");
                    self.begin_close(CloseCause::from(&e));
                    break;
                }
                None => {
                    self.begin_close(CloseCause::Closed(direction.source()));
                    break;
                }
            };

            match frame {
                Frame::Close(reason) => {
                    if self.begin_close(CloseCause::Closed(direction.source())) {
                        let forward = tx.send(Frame::Close(reason));
                        let _ = tokio::time::timeout(self.close_timeout, forward).await;
                    }
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => continue,
                frame => {
                    let len = frame.payload_len();
                    let sent = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        sent = tx.send(frame) => sent,
                    };
                    if let Err(e) = sent {
                        tracing::debug!(session_id = %self.id, direction = direction.as_str(), error = %e, "Send failed");
                        self.begin_close(CloseCause::from(&e));
                        break;
                    }
                    self.forwarded[direction.index()].fetch_add(1, Ordering::Relaxed);
                    metrics::record_relay_message(direction.as_str(), len);
                }
            }
        }
        (rx, tx)
    }
}

/// Close the sink, then read until the peer finishes its side of the close.
async fn close_and_drain<W, R>(mut tx: W, mut rx: R)
where
    W: Sink<Frame, Error = RelayError> + Unpin,
    R: Stream<Item = Result<Frame, RelayError>> + Unpin,
{
    let _ = tx.close().await;
    while let Some(Ok(_)) = rx.next().await {}
}
