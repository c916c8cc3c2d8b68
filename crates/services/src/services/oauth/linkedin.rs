use async_trait::async_trait;
use db::models::ad_account::AdPlatform;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::{OAuthError, OAuthProvider, TokenGrant, http_client, send_token_request};
use crate::services::{config::LinkedinAdsConfig, token_vault::TokenSet};

const AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const SCOPES: &str = "r_ads r_ads_reporting";

#[derive(Debug, Clone)]
pub struct LinkedinOAuth {
    http: Client,
    config: LinkedinAdsConfig,
}

impl LinkedinOAuth {
    pub fn new(config: LinkedinAdsConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }
}

#[async_trait]
impl OAuthProvider for LinkedinOAuth {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Linkedin
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_scopes() {
        let provider = LinkedinOAuth::new(LinkedinAdsConfig {
            client_id: "86abc".into(),
            client_secret: "s".to_string().into(),
        })
        .unwrap();
        let url = Url::parse(&provider.authorize_url("xyz", "https://api.example.com/cb")).unwrap();
        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned());
        assert_eq!(scope.as_deref(), Some("r_ads r_ads_reporting"));
    }
}
