//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment environment (drives CORS policy and log defaults).
    pub environment: Environment,

    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// WebSocket relay settings.
    pub relay: RelayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cross-origin policy for HTTP responses.
    pub cors: CorsConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Error alert delivery.
    pub alerts: AlertConfig,

    /// Token issuer credentials.
    pub tokens: TokenConfig,

    /// Optional translation relay.
    pub translate: TranslateConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Optional TLS configuration. Plaintext when absent.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Upper bound for the TLS handshake, in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            tls: None,
            max_connections: 10_000,
            handshake_timeout_secs: 10,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// WebSocket relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Enable the relay route.
    pub enabled: bool,

    /// Local path prefix that marks relay requests (e.g., "/rtasr").
    pub prefix: String,

    /// Upstream WebSocket endpoint the relay dials.
    pub upstream_base_url: String,

    /// Origin header forced on the upstream handshake.
    pub origin: String,

    /// Upper bound for the close-and-drain sequence, in milliseconds.
    pub close_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "/rtasr".to_string(),
            upstream_base_url: "wss://rtasr.xfyun.cn/v1/ws".to_string(),
            origin: "https://rtasr.xfyun.cn".to_string(),
            close_timeout_ms: 2_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long shutdown waits for connections and sessions to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed in production. Ignored in development (wildcard).
    pub allowed_origins: Vec<String>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Directory for `combined.log` and `error.log`. Stdout only when unset.
    pub log_dir: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            log_dir: None,
        }
    }
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Forward error events to the alert sink.
    pub enabled: bool,

    /// Webhook receiving alert payloads (JSON POST).
    pub webhook_url: Option<String>,

    /// Alerts buffered before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            queue_capacity: 256,
        }
    }
}

/// Token issuer credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// RTC application id embedded in issued tokens.
    pub app_id: String,

    /// Signing secret for RTC tokens.
    pub app_certificate: String,

    /// Token lifetime in seconds.
    pub expire_secs: u64,

    /// Zego application id.
    pub zego_app_id: String,

    /// Signing secret for Zego tokens.
    pub zego_server_secret: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_certificate: String::new(),
            expire_secs: 3600,
            zego_app_id: String::new(),
            zego_server_secret: String::new(),
        }
    }
}

/// Translation relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Register the translation route.
    pub enabled: bool,

    /// Vendor endpoint.
    pub endpoint: String,

    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,

    /// Vendor resource id (language pair dictionary).
    pub res_id: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://itrans.xf-yun.com/v1/its".to_string(),
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            res_id: "its_cn_en_word".to_string(),
        }
    }
}
