use async_trait::async_trait;
use db::models::ad_account::AdPlatform;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::{OAuthError, OAuthProvider, TokenGrant, http_client, send_token_request};
use crate::services::{config::GoogleAdsConfig, token_vault::TokenSet};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    http: Client,
    config: GoogleAdsConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleAdsConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Google
    }

    // `prompt=consent` makes Google issue a refresh token on every connect,
    // not only the first one.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", ADWORDS_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
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
        let request = self.http.post(TOKEN_URL).form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ]);
        Ok(send_token_request(request).await?.into())
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenGrant, OAuthError> {
        let refresh_token = tokens
            .refresh_token
            .as_ref()
            .ok_or(OAuthError::RefreshTokenMissing)?;

        let request = self.http.post(TOKEN_URL).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ]);
        Ok(send_token_request(request).await?.into())
    }
}
