//! RTC connection gateway.
//!
//! Terminates TLS, classifies each request once, and then serves it in one of
//! three ways: the REST surface (health, token issuance, translation), a
//! WebSocket relay to the speech vendor, or a silent drop for upgrades
//! outside the relay prefix.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Traffic handling
pub mod api;
pub mod relay;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{Gateway, Shutdown};
