//! Error alerting.
//!
//! # Responsibilities
//! - Capture `ERROR` events from the tracing pipeline
//! - Hand them to a background task over a bounded queue
//! - Deliver them through a pluggable [`AlertSink`]
//!
//! # Design Decisions
//! - The layer never blocks: a full queue drops the alert and counts it
//! - Delivery failures are logged under the `alerts` target, which the layer
//!   ignores, so a broken sink cannot feed itself

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::config::AlertConfig;
use crate::observability::metrics;

/// Log target used by the delivery task. Events on it never become alerts.
pub const ALERT_TARGET: &str = "alerts";

/// One captured error event.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub timestamp: String,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("alert endpoint returned status {0}")]
    Status(u16),
}

/// Destination for alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// POSTs each alert as JSON to a webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        let resp = self.client.post(&self.url).json(alert).send().await?;
        if !resp.status().is_success() {
            return Err(AlertError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Discards alerts.
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn deliver(&self, _alert: &Alert) -> Result<(), AlertError> {
        Ok(())
    }
}

/// `tracing_subscriber` layer that turns `ERROR` events into alerts.
#[derive(Debug, Clone)]
pub struct AlertLayer {
    tx: mpsc::Sender<Alert>,
}

impl AlertLayer {
    /// Create the layer and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() != Level::ERROR || meta.target().starts_with(ALERT_TARGET) {
            return;
        }

        let mut visitor = AlertVisitor::default();
        event.record(&mut visitor);

        let alert = Alert {
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        if self.tx.try_send(alert).is_err() {
            metrics::record_alert_dropped();
        }
    }
}

#[derive(Default)]
struct AlertVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Visit for AlertVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
        }
    }
}

/// Deliver queued alerts until every sender is gone.
pub fn spawn_delivery(mut rx: mpsc::Receiver<Alert>, sink: Arc<dyn AlertSink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            if let Err(e) = sink.deliver(&alert).await {
                tracing::warn!(target: "alerts", error = %e, "Failed to deliver alert");
            }
        }
    })
}

/// Build the alert layer for `config`, starting its delivery task.
///
/// Must be called from within the runtime.
pub fn alert_layer(config: &AlertConfig) -> Result<Option<AlertLayer>, AlertError> {
    if !config.enabled {
        return Ok(None);
    }
    let sink: Arc<dyn AlertSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url.clone(), Duration::from_secs(5))?),
        None => Arc::new(NoopAlertSink),
    };
    let (layer, rx) = AlertLayer::new(config.queue_capacity);
    spawn_delivery(rx, sink);
    Ok(Some(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn only_errors_become_alerts() {
        let (layer, mut rx) = AlertLayer::new(8);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("just info");
            tracing::warn!("a warning");
            tracing::error!(route = "token_generate", status = 500u64, "Handler failed");
            tracing::error!(target: "alerts", "delivery broke");
        });

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.message, "Handler failed");
        assert_eq!(alert.fields["route"], "token_generate");
        assert_eq!(alert.fields["status"], 500);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (layer, mut rx) = AlertLayer::new(1);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..5 {
                tracing::error!(attempt = i, "boom");
            }
        });

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
