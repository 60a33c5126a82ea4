//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper connection, classification, Axum router + middleware)
//!     → request.rs (request id, bounded JSON body)
//!     → websocket.rs (relay upgrade) | api dispatcher (REST)
//!     → response.rs (JSON bodies, opaque 500s)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use server::{GatewayServer, GatewayState};
