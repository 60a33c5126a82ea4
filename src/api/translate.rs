//! Machine translation through the Xunfei ITS API.
//!
//! Requests are signed with HMAC-SHA256 over
//! `host: <host>\ndate: <date>\nPOST <path> HTTP/1.1`; the signature travels
//! in the `authorization`, `host` and `date` query parameters.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use url::Url;

use crate::config::TranslateConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid translate configuration: {0}")]
    Config(String),
    #[error("translate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translate service returned status {0}")]
    Status(u16),
    #[error("unexpected translate response: {0}")]
    Decode(String),
}

/// Translates text between languages.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError>;
}

pub struct XunfeiTranslator {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    app_id: String,
    api_key: String,
    api_secret: String,
    res_id: String,
}

impl XunfeiTranslator {
    pub fn new(config: &TranslateConfig, timeout: Duration) -> Result<Self, TranslateError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| TranslateError::Config(e.to_string()))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(TranslateError::Config("endpoint has no host".into())),
        };
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout * 3)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            host,
            app_id: config.app_id.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            res_id: config.res_id.clone(),
        })
    }

    /// Base64 authorization parameter for a request sent at `date`.
    fn authorization(&self, date: &str) -> Result<String, TranslateError> {
        let canonical = format!(
            "host: {}\ndate: {}\nPOST {} HTTP/1.1",
            self.host,
            date,
            self.endpoint.path()
        );
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| TranslateError::Config("invalid api secret".into()))?;
        mac.update(canonical.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let header = format!(
            r#"api_key="{}", algorithm="hmac-sha256", headers="host date request-line", signature="{}""#,
            self.api_key, signature
        );
        Ok(STANDARD.encode(header))
    }

    fn signed_url(&self, date: &str) -> Result<String, TranslateError> {
        let authorization = self.authorization(date)?;
        let mut base = self.endpoint.clone();
        base.set_query(None);
        Ok(format!(
            "{}?authorization={}&host={}&date={}",
            base,
            urlencoding::encode(&authorization),
            urlencoding::encode(&self.host),
            urlencoding::encode(date)
        ))
    }

    fn payload(&self, text: &str, from: &str, to: &str) -> Value {
        json!({
            "header": { "app_id": self.app_id, "status": 3, "res_id": self.res_id },
            "parameter": { "its": { "from": from, "to": to, "result": {} } },
            "payload": {
                "input_data": { "encoding": "utf8", "status": 3, "text": STANDARD.encode(text) }
            }
        })
    }
}

/// RFC 1123 date as the signing scheme expects.
fn http_date() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Pull `trans_result.dst` out of the base64 JSON in `payload.result.text`.
fn parse_response(body: &Value) -> Result<String, TranslateError> {
    let encoded = body
        .pointer("/payload/result/text")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::Decode("missing payload.result.text".into()))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| TranslateError::Decode(e.to_string()))?;
    let result: Value = serde_json::from_slice(&decoded).map_err(|e| TranslateError::Decode(e.to_string()))?;
    result
        .pointer("/trans_result/dst")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TranslateError::Decode("missing trans_result.dst".into()))
}

#[async_trait]
impl Translator for XunfeiTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError> {
        let url = self.signed_url(&http_date())?;
        let resp = self
            .client
            .post(url)
            .json(&self.payload(text, from, to))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }
        let body: Value = resp.json().await?;
        parse_response(&body)
    }
}
