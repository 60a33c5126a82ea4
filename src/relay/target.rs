//! Upstream target derivation.
//!
//! A relay target is a pure function of the inbound request: the path left
//! after the relay prefix is appended to the upstream base URL, the query
//! string is carried over verbatim and the configured header overrides are
//! attached.
//!
//! The target URL is assembled as a string. `ws` and `wss` are special
//! schemes, so round-tripping the inbound query through [`Url`] would
//! re-encode characters such as `'` and break vendor signatures.

use axum::http::header::{HeaderMap, HeaderValue, InvalidHeaderValue, ORIGIN};
use thiserror::Error;
use url::{Position, Url};

/// Errors building relay targets.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid upstream base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("upstream base url must use ws or wss, got '{0}'")]
    Scheme(String),
    #[error("invalid origin header: {0}")]
    Origin(#[from] InvalidHeaderValue),
}

/// Where a relay session connects to, and with which headers.
#[derive(Debug, Clone)]
pub struct RelayTarget {
    /// Upstream URL, with the inbound query appended byte for byte.
    pub url: String,
    pub headers: HeaderMap,
}

/// Builds [`RelayTarget`]s for one upstream.
#[derive(Debug, Clone)]
pub struct RelayTargetBuilder {
    base: Url,
    headers: HeaderMap,
}

impl RelayTargetBuilder {
    /// Create a builder for `base_url`, forcing `origin` on every target.
    pub fn new(base_url: &str, origin: &str) -> Result<Self, TargetError> {
        let base = Url::parse(base_url)?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(TargetError::Scheme(base.scheme().to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(origin)?);

        Ok(Self { base, headers })
    }

    /// Build the target for the path remainder `suffix` and the raw `query`.
    pub fn build(&self, suffix: &str, query: Option<&str>) -> RelayTarget {
        let head = &self.base[..Position::AfterPath];
        let mut url = if suffix.is_empty() {
            head.to_string()
        } else {
            format!("{}{}", head.trim_end_matches('/'), suffix)
        };

        let base_query = self.base.query().filter(|q| !q.is_empty());
        let query = query.filter(|q| !q.is_empty());
        match (base_query, query) {
            (Some(existing), Some(query)) => {
                url.push('?');
                url.push_str(existing);
                url.push('&');
                url.push_str(query);
            }
            (Some(only), None) | (None, Some(only)) => {
                url.push('?');
                url.push_str(only);
            }
            (None, None) => {}
        }

        RelayTarget {
            url,
            headers: self.headers.clone(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}
