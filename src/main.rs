//! RTC connection gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                      GATEWAY                          │
//!                         │                                                       │
//!   Client (HTTPS / WSS)  │  ┌─────────┐   ┌─────────┐   ┌──────────────┐        │
//!   ──────────────────────┼─▶│   net   │──▶│  http   │──▶│   routing    │        │
//!                         │  │listener │   │ server  │   │  classify    │        │
//!                         │  │  + tls  │   └─────────┘   └──────┬───────┘        │
//!                         │  └─────────┘                        │                │
//!                         │            ┌────────────────┬───────┴──────┐         │
//!                         │            ▼                ▼              ▼         │
//!                         │     ┌────────────┐   ┌────────────┐  ┌──────────┐    │
//!                         │     │    api     │   │   relay    │  │  reject  │    │
//!                         │     │ token/xlat │   │  session   │  │ (drop)   │    │
//!                         │     └────────────┘   └─────┬──────┘  └──────────┘    │
//!                         │                            │                         │
//!                         └────────────────────────────┼─────────────────────────┘
//!                                                      ▼
//!                                              Upstream vendor (WSS)
//! ```

use std::path::PathBuf;

use clap::Parser;

use rtc_gateway::config::{self, ConfigError, GatewayConfig};
use rtc_gateway::lifecycle::{signals, Gateway, Shutdown};
use rtc_gateway::observability::{alert, logging, metrics};

#[derive(Parser)]
#[command(name = "rtc-gateway", version, about = "TLS/WebSocket connection gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

fn load(args: &Args) -> Result<GatewayConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::loader::config_from_env()?,
    };
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
        config::validation::validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load(&args)?;

    let alerts = alert::alert_layer(&config.alerts)?;
    let _log_guard = logging::init_logging(&config.observability, alerts)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rtc-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        tls = config.listener.tls.is_some(),
        relay_prefix = %config.relay.prefix,
        upstream = %config.relay.upstream_base_url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::install(shutdown.clone());

    let gateway = Gateway::build(&config, shutdown).await?;
    gateway.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
