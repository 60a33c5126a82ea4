//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → tls.rs (plaintext check, TLS handshake; skipped without TLS config)
//!     → connection.rs (lifecycle tracking for graceful shutdown)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accepts prevent resource exhaustion
//! - Each connection and relay session tracked for graceful shutdown
//! - Handshake failures end the connection task only

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tls::{install_crypto_provider, load_tls_config, TlsError, TlsTerminator};
