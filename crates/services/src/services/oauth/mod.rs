//! OAuth flows for the supported ad platforms.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::ad_account::AdPlatform;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use super::token_vault::TokenSet;

pub mod google;
pub mod linkedin;
pub mod meta;
pub mod state;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("platform not configured: {0}")]
    NotConfigured(AdPlatform),
    #[error("refresh token missing")]
    RefreshTokenMissing,
    #[error("authorization expired, reconnect the account: {0}")]
    ReconnectRequired(String),
    #[error("authorization denied: {0}")]
    Denied(String),
    #[error("invalid oauth state: {0}")]
    InvalidState(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("provider returned http {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected token response: {0}")]
    Decode(String),
}

impl OAuthError {
    /// The stored grant is unusable and only a new consent can fix it
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::RefreshTokenMissing | Self::ReconnectRequired(_))
    }
}

/// Token endpoint result before it is stored
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Lifetime in seconds from the time of issue
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    /// Convert to a storable token set. A grant without a refresh token
    /// keeps the one from `previous`.
    pub fn into_token_set(self, previous: Option<&TokenSet>, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expires_at: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn platform(&self) -> AdPlatform;

    /// Consent screen URL the browser is sent to
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String;

    async fn exchange_code(&self, code: &str, redirect_uri: &str)
    -> Result<TokenGrant, OAuthError>;

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenGrant, OAuthError>;
}

/// Standard RFC 6749 token endpoint body
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl From<TokenEndpointResponse> for TokenGrant {
    fn from(res: TokenEndpointResponse) -> Self {
        Self {
            access_token: res.access_token.into(),
            refresh_token: res.refresh_token.filter(|t| !t.is_empty()).map(Into::into),
            expires_in: res.expires_in,
        }
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<Client, OAuthError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("adsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OAuthError::Transport(e.to_string()))
}

pub(crate) async fn send_token_request(
    request: RequestBuilder,
) -> Result<TokenEndpointResponse, OAuthError> {
    let res = request
        .send()
        .await
        .map_err(|e| OAuthError::Transport(e.to_string()))?;
    let status = res.status();
    let body = res.text().await.unwrap_or_default();

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| OAuthError::Decode(e.to_string()));
    }
    Err(classify_token_error(status, &body))
}

/// Map a failed token endpoint response to an error.
/// `invalid_grant` (Google, LinkedIn) and Graph error code 190 (Meta) mean
/// the grant is dead.
pub(crate) fn classify_token_error(status: StatusCode, body: &str) -> OAuthError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return OAuthError::RateLimited;
    }

    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error_code = parsed.get("error").and_then(|e| e.as_str());
    let graph_code = parsed
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_i64());

    if error_code == Some("invalid_grant") || graph_code == Some(190) {
        let description = parsed
            .get("error_description")
            .and_then(|d| d.as_str())
            .or_else(|| {
                parsed
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
            })
            .unwrap_or("grant revoked or expired");
        return OAuthError::ReconnectRequired(description.to_string());
    }

    OAuthError::Provider {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_grant_keeps_previous_refresh_token() {
        let now = Utc::now();
        let previous = TokenSet {
            access_token: "old".to_string().into(),
            refresh_token: Some("1//refresh".to_string().into()),
            expires_at: None,
        };
        let grant = TokenGrant {
            access_token: "new".to_string().into(),
            refresh_token: None,
            expires_in: Some(3599),
        };
        let set = grant.into_token_set(Some(&previous), now);
        assert_eq!(set.access_token.expose_secret(), "new");
        assert_eq!(set.refresh_token.unwrap().expose_secret(), "1//refresh");
        assert_eq!(set.expires_at, Some(now + chrono::Duration::seconds(3599)));
    }

    #[test]
    fn test_grant_without_expiry() {
        let grant = TokenGrant {
            access_token: "t".to_string().into(),
            refresh_token: None,
            expires_in: Some(0),
        };
        let set = grant.into_token_set(None, Utc::now());
        assert!(set.expires_at.is_none());
        assert!(set.refresh_token.is_none());
    }

    #[test]
    fn test_classify_invalid_grant() {
        let err = classify_token_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        );
        assert_eq!(
            err,
            OAuthError::ReconnectRequired("Token has been expired or revoked.".into())
        );
        assert!(err.requires_reconnect());
    }

    #[test]
    fn test_classify_graph_expired_token() {
        let err = classify_token_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Error validating access token","type":"OAuthException","code":190}}"#,
        );
        assert!(matches!(err, OAuthError::ReconnectRequired(msg) if msg.contains("validating")));
    }

    #[test]
    fn test_classify_rate_limit_and_other() {
        assert_eq!(
            classify_token_error(StatusCode::TOO_MANY_REQUESTS, ""),
            OAuthError::RateLimited
        );
        assert_eq!(
            classify_token_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            OAuthError::Provider {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[test]
    fn test_empty_refresh_token_is_dropped() {
        let grant: TokenGrant = TokenEndpointResponse {
            access_token: "a".into(),
            refresh_token: Some(String::new()),
            expires_in: None,
        }
        .into();
        assert!(grant.refresh_token.is_none());
    }
}
