use async_trait::async_trait;
use chrono::Utc;
use db::models::ad_account::AdPlatform;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::{OAuthError, OAuthProvider, TokenGrant, http_client, send_token_request};
use crate::services::{config::MetaAdsConfig, token_vault::TokenSet};

pub const GRAPH_API_VERSION: &str = "v19.0";
const SCOPES: &str = "ads_read,business_management";

/// Meta issues no refresh tokens. The short-lived token from the code
/// exchange is swapped for a long-lived one (about 60 days), and "refresh"
/// swaps the current long-lived token for a new one while it is valid.
#[derive(Debug, Clone)]
pub struct MetaOAuth {
    http: Client,
    config: MetaAdsConfig,
}

impl MetaOAuth {
    pub fn new(config: MetaAdsConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    fn token_url() -> String {
        format!("https://graph.facebook.com/{GRAPH_API_VERSION}/oauth/access_token")
    }

    async fn exchange_for_long_lived(&self, token: &str) -> Result<TokenGrant, OAuthError> {
        let request = self.http.get(Self::token_url()).query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.expose_secret()),
            ("fb_exchange_token", token),
        ]);
        let mut grant: TokenGrant = send_token_request(request).await?.into();
        grant.refresh_token = None;
        Ok(grant)
    }
}

#[async_trait]
impl OAuthProvider for MetaOAuth {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Meta
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        let base = format!("https://www.facebook.com/{GRAPH_API_VERSION}/dialog/oauth");
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.config.app_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .map(String::from)
        .unwrap_or_default()
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, OAuthError> {
        let request = self.http.get(Self::token_url()).query(&[
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.expose_secret()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ]);
        let short_lived = send_token_request(request).await?;
        self.exchange_for_long_lived(&short_lived.access_token).await
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenGrant, OAuthError> {
        if tokens.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(OAuthError::ReconnectRequired(
                "long-lived Meta token has expired".into(),
            ));
        }
        self.exchange_for_long_lived(tokens.access_token.expose_secret())
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn provider() -> MetaOAuth {
        MetaOAuth::new(MetaAdsConfig {
            app_id: "987654".into(),
            app_secret: "shh".to_string().into(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url() {
        let url = provider().authorize_url("abc", "https://api.example.com/api/oauth/meta/callback");
        assert!(url.starts_with("https://www.facebook.com/v19.0/dialog/oauth?"));
        assert!(url.contains("client_id=987654"));
        assert!(url.contains("scope=ads_read%2Cbusiness_management"));
        assert!(url.contains("state=abc"));
    }

    #[tokio::test]
    async fn test_expired_token_cannot_be_refreshed() {
        let tokens = TokenSet {
            access_token: "EAAB".to_string().into(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::hours(1)),
        };
        let err = provider().refresh(&tokens).await.unwrap_err();
        assert!(err.requires_reconnect());
    }
}
