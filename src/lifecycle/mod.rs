//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → TLS material → Routes + dispatcher → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Graceful HTTP shutdown + session close → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, listener last
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a deadline (`timeouts.shutdown_grace_secs`)

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Gateway, StartupError};
