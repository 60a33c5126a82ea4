//! Startup orchestration.
//!
//! # Responsibilities
//! - Load TLS material (fail fast on unreadable files)
//! - Build the route table, REST dispatcher and server
//! - Bind the listener last, so traffic only arrives when everything is ready
//!
//! # Design Decisions
//! - Any startup error is fatal; after startup nothing ends the process
//!   except a shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::{GatewayDispatcher, RestDispatcher, TranslateError};
use crate::config::{ConfigError, GatewayConfig};
use crate::http::GatewayServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{install_crypto_provider, load_tls_config, Listener, ListenerError, TlsError, TlsTerminator};
use crate::relay::target::TargetError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("relay target error: {0}")]
    Routes(#[from] TargetError),

    #[error("translator setup failed: {0}")]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A bound, ready-to-run gateway.
pub struct Gateway {
    server: GatewayServer,
    listener: Listener,
}

impl Gateway {
    /// Build with the gateway's own REST handlers.
    pub async fn build(config: &GatewayConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let dispatcher = Arc::new(GatewayDispatcher::from_config(config)?);
        Self::build_with(config, dispatcher, shutdown).await
    }

    /// Build with a custom REST dispatcher.
    pub async fn build_with(
        config: &GatewayConfig,
        dispatcher: Arc<dyn RestDispatcher>,
        shutdown: Shutdown,
    ) -> Result<Self, StartupError> {
        // Upstream wss dials use the same provider as the listener.
        install_crypto_provider();

        let tls = match &config.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(tls).await?;
                tracing::info!(cert_path = %tls.cert_path, "TLS material loaded");
                Some(TlsTerminator::new(
                    &rustls,
                    Duration::from_secs(config.listener.handshake_timeout_secs),
                ))
            }
            None => {
                tracing::warn!("No TLS configured, serving plaintext");
                None
            }
        };

        let server = GatewayServer::new(config, dispatcher, tls, shutdown)?;
        let listener = Listener::bind(&config.listener).await?;

        Ok(Self { server, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn server(&self) -> &GatewayServer {
        &self.server
    }

    /// Serve until shutdown.
    pub async fn run(self) -> Result<(), ListenerError> {
        self.server.run(self.listener).await
    }
}
