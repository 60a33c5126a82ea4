//! Configuration loading from disk and the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finalize(config)
}

/// Build configuration from defaults plus environment overrides.
pub fn config_from_env() -> Result<GatewayConfig, ConfigError> {
    finalize(GatewayConfig::default())
}

fn finalize(mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay secrets, the listening port and the log directory from environment variables.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
        if let Ok(mut addr) = config.listener.bind_address.parse::<SocketAddr>() {
            addr.set_port(port);
            config.listener.bind_address = addr.to_string();
        }
    }

    let secrets: [(&str, &mut String); 7] = [
        ("AGORA_APP_ID", &mut config.tokens.app_id),
        ("AGORA_APP_CERTIFICATE", &mut config.tokens.app_certificate),
        ("ZEGO_APP_ID", &mut config.tokens.zego_app_id),
        ("ZEGO_SERVER_SECRET", &mut config.tokens.zego_server_secret),
        ("XF_APP_ID", &mut config.translate.app_id),
        ("XF_API_KEY", &mut config.translate.api_key),
        ("XF_API_SECRET", &mut config.translate.api_secret),
    ];
    for (key, slot) in secrets {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }

    if let Some(url) = lookup("ALERT_WEBHOOK_URL").filter(|v| !v.is_empty()) {
        config.alerts.webhook_url = Some(url);
    }
    if let Some(dir) = lookup("LOG_DIR").filter(|v| !v.is_empty()) {
        config.observability.log_dir = Some(dir);
    }
}
