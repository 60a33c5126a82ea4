//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events → logging.rs (EnvFilter + fmt, pretty or JSON)
//!                      → alert.rs (ERROR events → bounded queue → AlertSink)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (log aggregation)
//!     → Prometheus scrape endpoint
//!     → Alert webhook
//! ```
//!
//! # Design Decisions
//! - Structured fields everywhere (session_id, route, error)
//! - Request ID flows through HTTP spans
//! - Metrics are cheap (atomic increments)

pub mod alert;
pub mod logging;
pub mod metrics;
