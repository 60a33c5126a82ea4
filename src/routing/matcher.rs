//! Route matching logic.
//!
//! # Responsibilities
//! - Match request paths (exact or segment-aware prefix)
//! - Match request methods
//! - Detect WebSocket upgrade requests
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefix matching respects segment boundaries ("/rtasr" does not match "/rtasrx")
//! - Upgrade detection is case-insensitive
//! - No regex to guarantee O(n) matching

use axum::http::{header, HeaderMap, Method};

/// How a route compares against a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// The whole path must be equal.
    Exact(String),
    /// The path must equal the prefix or continue it with a `/` segment.
    Prefix(String),
}

impl PathPattern {
    /// Returns true if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }

    /// Returns the remainder of `path` after the pattern, if it matches.
    ///
    /// Exact patterns always leave an empty remainder.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self {
            PathPattern::Exact(expected) => (path == expected.as_str()).then_some(""),
            PathPattern::Prefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                (rest.is_empty() || rest.starts_with('/')).then_some(rest)
            }
        }
    }
}

/// Matches a request method against an allow list. An empty list matches any method.
pub fn method_allowed(allowed: &[Method], method: &Method) -> bool {
    allowed.is_empty() || allowed.contains(method)
}

/// Returns true if the request asks for a WebSocket upgrade.
///
/// Only the `Upgrade` header is inspected; handshake validity (Connection,
/// key, version) is checked by the upgrade handler.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}
