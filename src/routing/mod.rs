//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (single pass over the route table)
//!     → matcher.rs (path pattern, method, upgrade detection)
//!     → Return: Dispatch::{Relay, Health, Rest, NotFound, Reject}
//!
//! Route Compilation (at startup):
//!     GatewayConfig
//!     → relay route (if enabled), health, REST endpoints
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Classification happens before any response bytes are written

pub mod matcher;
pub mod router;

pub use router::{Dispatch, RejectReason, RestEndpoint, Route, RouteKind, RouteTable};
