//! Upstream WebSocket dialing.
//!
//! # Responsibilities
//! - Open the outbound WebSocket (ws or wss) to the relay target
//! - Attach the target's header overrides (Origin) to the handshake
//! - Bound the whole dial, TCP + TLS + handshake, by one timeout
//! - Categorize failures for logs and metrics

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::relay::target::RelayTarget;

/// An established upstream leg.
pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why the upstream could not be reached.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("upstream connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] io::Error),

    #[error("upstream TLS failure: {0}")]
    Tls(String),

    #[error("upstream rejected handshake with status {0}")]
    Rejected(StatusCode),

    #[error("upstream handshake failed: {0}")]
    Handshake(String),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidTarget(_) => "invalid_target",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Unreachable(_) => "unreachable",
            UpstreamError::Tls(_) => "tls",
            UpstreamError::Rejected(_) => "rejected",
            UpstreamError::Handshake(_) => "handshake",
        }
    }
}

impl From<WsError> for UpstreamError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::Io(e) => UpstreamError::Unreachable(e),
            WsError::Tls(e) => UpstreamError::Tls(e.to_string()),
            WsError::Http(resp) => UpstreamError::Rejected(resp.status()),
            WsError::Url(e) => UpstreamError::InvalidTarget(e.to_string()),
            WsError::HttpFormat(e) => UpstreamError::InvalidTarget(e.to_string()),
            other => UpstreamError::Handshake(other.to_string()),
        }
    }
}

/// Dials relay targets.
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    connect_timeout: Duration,
}

impl UpstreamConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `target`. Header overrides replace any default the
    /// handshake would send. The URL is parsed here, once, and sent as is.
    pub async fn connect(&self, target: &RelayTarget) -> Result<UpstreamStream, UpstreamError> {
        let mut request = target.url.as_str().into_client_request()?;
        for (name, value) in &target.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        tracing::debug!(upstream = %target.url, "Dialing upstream");

        let (ws, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.connect_timeout))??;

        tracing::debug!(
            upstream = %target.url,
            status = response.status().as_u16(),
            "Upstream handshake complete"
        );
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::target::RelayTargetBuilder;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite;

    fn target(url: &str) -> RelayTarget {
        RelayTargetBuilder::new(url, "https://vendor.example.com")
            .unwrap()
            .build("", None)
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = UpstreamConnector::new(Duration::from_secs(2));
        let err = connector
            .connect(&target(&format!("ws://{}/v1/ws", addr)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts TCP but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let connector = UpstreamConnector::new(Duration::from_millis(200));
        let err = connector
            .connect(&target(&format!("ws://{}/v1/ws", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn origin_header_is_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut origin = None;
            let _ws = tokio_tungstenite::accept_hdr_async(
                sock,
                |req: &tungstenite::handshake::server::Request,
                 resp: tungstenite::handshake::server::Response|
                 -> Result<
                    tungstenite::handshake::server::Response,
                    tungstenite::handshake::server::ErrorResponse,
                > {
                    origin = req
                        .headers()
                        .get("origin")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            origin
        });

        let connector = UpstreamConnector::new(Duration::from_secs(2));
        let _ws = connector
            .connect(&target(&format!("ws://{}/v1/ws", addr)))
            .await
            .unwrap();

        assert_eq!(seen.await.unwrap().as_deref(), Some("https://vendor.example.com"));
    }

    #[tokio::test]
    async fn refused_handshake_is_rejected_with_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let _ = tokio_tungstenite::accept_hdr_async(
                sock,
                |_req: &tungstenite::handshake::server::Request,
                 _resp: tungstenite::handshake::server::Response|
                 -> Result<
                    tungstenite::handshake::server::Response,
                    tungstenite::handshake::server::ErrorResponse,
                > {
                    Err(tungstenite::http::Response::builder()
                        .status(403)
                        .body(Some("forbidden".to_string()))
                        .unwrap())
                },
            )
            .await;
        });

        let connector = UpstreamConnector::new(Duration::from_secs(2));
        let err = connector
            .connect(&target(&format!("ws://{}/v1/ws", addr)))
            .await
            .unwrap_err();
        match err {
            UpstreamError::Rejected(status) => assert_eq!(status, StatusCode::FORBIDDEN),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparsable_target_is_invalid() {
        let mut target = target("ws://127.0.0.1:1/v1/ws");
        target.url = "ws://127.0.0.1:1/v1/ws?bad query".into();

        let err = UpstreamConnector::new(Duration::from_secs(1))
            .connect(&target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_target");
    }
}
