//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use rtc_gateway::api::{GatewayDispatcher, RestDispatcher};
use rtc_gateway::config::{GatewayConfig, TlsConfig};
use rtc_gateway::{Gateway, Shutdown};

pub const WINDOW: Duration = Duration::from_secs(3);
pub const ORIGIN: &str = "https://rtasr.vendor.test";

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestGateway {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Plaintext config with the relay pointed at `upstream`.
pub fn test_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.relay.upstream_base_url = format!("ws://{}/v1/ws", upstream);
    config.relay.origin = ORIGIN.into();
    config.relay.close_timeout_ms = 500;
    config.timeouts.connect_secs = 2;
    config.timeouts.shutdown_grace_secs = 2;
    config.tokens.app_id = "test-app".into();
    config.tokens.app_certificate = "test-certificate".into();
    config.tokens.zego_app_id = "test-zego".into();
    config.tokens.zego_server_secret = "test-zego-secret".into();
    config
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn with_tls(mut config: GatewayConfig) -> GatewayConfig {
    config.listener.tls = Some(TlsConfig {
        cert_path: fixture("server.pem").display().to_string(),
        key_path: fixture("server.key").display().to_string(),
    });
    config
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let dispatcher = Arc::new(GatewayDispatcher::from_config(&config).unwrap());
    start_gateway_with(config, dispatcher).await
}

pub async fn start_gateway_with(config: GatewayConfig, dispatcher: Arc<dyn RestDispatcher>) -> TestGateway {
    let shutdown = Shutdown::new();
    let gateway = Gateway::build_with(&config, dispatcher, shutdown.clone())
        .await
        .unwrap();
    let addr = gateway.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        gateway.run().await.unwrap();
    });
    TestGateway { addr, shutdown, handle }
}

/// One accepted upstream connection.
pub struct UpstreamConn {
    pub path: String,
    pub origin: Option<String>,
    pub ws: WebSocketStream<TcpStream>,
}

/// A WebSocket server standing in for the vendor.
pub struct MockUpstream {
    pub addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<UpstreamConn>,
    refused: mpsc::UnboundedReceiver<String>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// A vendor that answers every handshake with `status` instead of 101.
    pub async fn refusing(status: u16) -> Self {
        Self::spawn(Some(status)).await
    }

    async fn spawn(refuse: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        let (refused_tx, refused) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let tx = tx.clone();
                let refused_tx = refused_tx.clone();
                tokio::spawn(async move {
                    let mut path = String::new();
                    let mut origin = None;
                    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        path = req
                            .uri()
                            .path_and_query()
                            .map(|pq| pq.as_str().to_string())
                            .unwrap_or_default();
                        origin = req
                            .headers()
                            .get("origin")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        match refuse {
                            Some(status) => Err(tokio_tungstenite::tungstenite::http::Response::builder()
                                .status(status)
                                .body(Some("refused by mock vendor".to_string()))
                                .unwrap()),
                            None => Ok(resp),
                        }
                    };
                    match tokio_tungstenite::accept_hdr_async(socket, callback).await {
                        Ok(ws) => {
                            let _ = tx.send(UpstreamConn { path, origin, ws });
                        }
                        Err(_) if refuse.is_some() => {
                            let _ = refused_tx.send(path);
                        }
                        Err(_) => {}
                    }
                });
            }
        });

        Self { addr, conns, refused }
    }

    /// Wait for the next relay session to reach the upstream.
    pub async fn next_conn(&mut self) -> UpstreamConn {
        tokio::time::timeout(WINDOW, self.conns.recv())
            .await
            .expect("no upstream connection within window")
            .expect("mock upstream stopped")
    }

    /// Wait for the next refused handshake. Returns its request path.
    pub async fn next_refused(&mut self) -> String {
        tokio::time::timeout(WINDOW, self.refused.recv())
            .await
            .expect("no refused handshake within window")
            .expect("mock upstream stopped")
    }
}

/// An address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub async fn connect_client(url: &str) -> ClientStream {
    let (ws, resp) = tokio::time::timeout(WINDOW, tokio_tungstenite::connect_async(url))
        .await
        .expect("client connect timed out")
        .expect("client handshake failed");
    assert_eq!(resp.status(), 101);
    ws
}

/// Next text, binary or close message, skipping control frames.
pub async fn next_message<S>(ws: &mut WebSocketStream<S>) -> Message
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::time::timeout(WINDOW, ws.next())
            .await
            .expect("no message within window")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            msg => return msg,
        }
    }
}

/// Write raw bytes, then read until the server closes.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut received = Vec::new();
    let read = tokio::time::timeout(WINDOW, stream.read_to_end(&mut received)).await;
    assert!(read.is_ok(), "server kept the connection open");
    received
}
