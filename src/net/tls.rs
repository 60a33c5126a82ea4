//! TLS termination.
//!
//! # Responsibilities
//! - Load the certificate/key pair at startup (fail fast)
//! - Peek each new connection; answer plaintext HTTP with a bare 400
//! - Run the server handshake, bounded by the handshake timeout

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// The only protocol offered through ALPN. Relay upgrades need HTTP/1.1.
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// First byte of a TLS handshake record.
const TLS_HANDSHAKE_RECORD: u8 = 0x16;

const PLAINTEXT_BODY: &str = "This port only accepts HTTPS requests.\n";

/// TLS setup or handshake failure.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{kind} file not found: {path}")]
    MissingFile { kind: &'static str, path: String },

    #[error("failed to load TLS material: {0}")]
    Material(#[source] io::Error),

    #[error("plaintext HTTP sent to TLS port")]
    PlaintextHttp,

    #[error("client closed before handshake")]
    Eof,

    #[error("TLS handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

impl TlsError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TlsError::MissingFile { .. } | TlsError::Material(_) => "material",
            TlsError::PlaintextHttp => "plaintext_http",
            TlsError::Eof => "eof",
            TlsError::Timeout(_) => "timeout",
            TlsError::Handshake(_) => "handshake",
        }
    }
}

/// Make aws-lc-rs the process-wide rustls provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Load the PEM certificate chain and private key.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    install_crypto_provider();
    for (kind, path) in [("certificate", &config.cert_path), ("private key", &config.key_path)] {
        if !Path::new(path).exists() {
            return Err(TlsError::MissingFile {
                kind,
                path: path.clone(),
            });
        }
    }

    RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(TlsError::Material)
}

/// Server-side TLS for accepted connections.
#[derive(Clone)]
pub struct TlsTerminator {
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsTerminator {
    pub fn new(config: &RustlsConfig, handshake_timeout: Duration) -> Self {
        let mut server = (*config.get_inner()).clone();
        server.alpn_protocols = vec![ALPN_HTTP1.to_vec()];
        Self {
            acceptor: TlsAcceptor::from(Arc::new(server)),
            handshake_timeout,
        }
    }

    /// Secure `stream`, or explain why it could not be.
    pub async fn accept(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, TlsError> {
        tokio::time::timeout(self.handshake_timeout, self.handshake(stream))
            .await
            .map_err(|_| TlsError::Timeout(self.handshake_timeout))?
    }

    async fn handshake(&self, mut stream: TcpStream) -> Result<TlsStream<TcpStream>, TlsError> {
        let mut first = [0u8; 1];
        let n = stream.peek(&mut first).await.map_err(TlsError::Handshake)?;
        if n == 0 {
            return Err(TlsError::Eof);
        }

        if first[0] != TLS_HANDSHAKE_RECORD && first[0].is_ascii_uppercase() {
            reject_plaintext(&mut stream).await;
            return Err(TlsError::PlaintextHttp);
        }

        self.acceptor
            .accept(stream)
            .await
            .map_err(TlsError::Handshake)
    }
}

/// Best-effort 400 on a raw socket. Reads what the client already sent so
/// the close is not turned into a reset.
async fn reject_plaintext(stream: &mut TcpStream) {
    let mut discard = [0u8; 4096];
    let _ = tokio::time::timeout(Duration::from_millis(100), stream.read(&mut discard)).await;

    let response = format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        PLAINTEXT_BODY.len(),
        PLAINTEXT_BODY
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_fails_fast() {
        let config = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        match load_tls_config(&config).await {
            Err(TlsError::MissingFile { kind, .. }) => assert_eq!(kind, "certificate"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn error_kinds() {
        assert_eq!(TlsError::PlaintextHttp.kind(), "plaintext_http");
        assert_eq!(TlsError::Timeout(Duration::from_secs(1)).kind(), "timeout");
    }
}
