//! Signed access tokens.
//!
//! Token layout: `base64url(claims JSON) "." base64url(HMAC-SHA256(secret, first part))`.
//! Verification recomputes the MAC in constant time and rejects expired claims.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ROLE_PUBLISHER: &str = "publisher";
pub const ROLE_SUBSCRIBER: &str = "subscriber";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token issuer is not configured")]
    NotConfigured,
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token lifetime of {0:?} is out of range")]
    TtlOutOfRange(Duration),
    #[error("failed to encode claims: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// What to put in a new token.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub subject: String,
    pub channel: Option<String>,
    pub role: String,
    pub ttl: Duration,
}

/// Decoded token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub uid: String,
    pub role: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

/// Issues and verifies tokens for one application.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, request: &TokenRequest) -> Result<String, TokenError>;

    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;

    /// Lifetime used when the caller does not ask for one.
    fn default_ttl(&self) -> Duration;
}

#[derive(Clone)]
pub struct HmacTokenIssuer {
    app_id: String,
    secret: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for HmacTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenIssuer")
            .field("app_id", &self.app_id)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl HmacTokenIssuer {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
            default_ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::NotConfigured);
        }
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| TokenError::NotConfigured)
    }
}

impl TokenIssuer for HmacTokenIssuer {
    fn issue(&self, request: &TokenRequest) -> Result<String, TokenError> {
        let mut mac = self.mac()?;

        let iat = chrono::Utc::now().timestamp();
        let exp = i64::try_from(request.ttl.as_secs())
            .ok()
            .and_then(|ttl| iat.checked_add(ttl))
            .ok_or(TokenError::TtlOutOfRange(request.ttl))?;
        let claims = TokenClaims {
            app_id: self.app_id.clone(),
            channel: request.channel.clone(),
            uid: request.subject.clone(),
            role: request.role.clone(),
            iat,
            exp,
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut mac = self.mac()?;

        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: TokenClaims = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

        if claims.app_id != self.app_id {
            return Err(TokenError::InvalidSignature);
        }
        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> HmacTokenIssuer {
        HmacTokenIssuer::new("app-1", "certificate", Duration::from_secs(3600))
    }

    fn request(ttl: Duration) -> TokenRequest {
        TokenRequest {
            subject: "42".into(),
            channel: Some("room".into()),
            role: ROLE_PUBLISHER.into(),
            ttl,
        }
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = issuer();
        let token = issuer.issue(&request(Duration::from_secs(3600))).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.uid, "42");
        assert_eq!(claims.channel.as_deref(), Some("room"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = issuer();
        let token = issuer.issue(&request(Duration::from_secs(60))).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"app_id":"app-1","uid":"1","role":"publisher","iat":0,"exp":9999999999}"#);
        let forged = format!("{forged_claims}.{signature}");
        assert!(matches!(issuer.verify(&forged), Err(TokenError::InvalidSignature)));
        assert!(matches!(issuer.verify("garbage"), Err(TokenError::Malformed)));
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = issuer().issue(&request(Duration::from_secs(60))).unwrap();
        let other = HmacTokenIssuer::new("app-1", "different", Duration::from_secs(60));
        assert!(matches!(other.verify(&token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let token = issuer.issue(&request(Duration::ZERO)).unwrap();
        assert!(matches!(issuer.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn missing_secret_is_not_configured() {
        let issuer = HmacTokenIssuer::new("app-1", "", Duration::from_secs(60));
        assert!(matches!(
            issuer.issue(&request(Duration::from_secs(60))),
            Err(TokenError::NotConfigured)
        ));
    }

    #[test]
    fn oversized_lifetime_is_an_error() {
        let issuer = issuer();
        for secs in [u64::MAX, i64::MAX as u64, 9_223_372_036_854_775_000] {
            assert!(matches!(
                issuer.issue(&request(Duration::from_secs(secs))),
                Err(TokenError::TtlOutOfRange(_))
            ));
        }
    }
}
