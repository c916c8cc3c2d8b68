//! Runtime configuration read from the environment.

use std::{net::SocketAddr, time::Duration};

use db::models::ad_account::AdPlatform;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct GoogleAdsConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub developer_token: SecretString,
    /// Manager account used as `login-customer-id` when set
    pub login_customer_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetaAdsConfig {
    pub app_id: String,
    pub app_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct LinkedinAdsConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub lookback_days: i64,
    /// `None` disables the periodic sync loop
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: SecretString,
    pub bind_addr: SocketAddr,
    /// Base URL this API is reachable at; OAuth redirect URIs hang off it
    pub public_base_url: Url,
    /// Where the browser lands after the OAuth callback
    pub frontend_url: Url,
    pub token_encryption_key: SecretString,
    pub jwt_secret: SecretString,
    pub oauth_state_secret: SecretString,
    pub google: Option<GoogleAdsConfig>,
    pub meta: Option<MetaAdsConfig>,
    pub linkedin: Option<LinkedinAdsConfig>,
    pub sync: SyncConfig,
    pub anthropic_api_key: Option<SecretString>,
}

impl Config {
    const DEFAULT_BIND: &'static str = "0.0.0.0:3001";
    const DEFAULT_LOOKBACK_DAYS: i64 = 30;
    const MAX_LOOKBACK_DAYS: i64 = 365;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("HOST");
        let port = get("PORT");
        let bind_addr = match (host, port) {
            (None, None) => Self::DEFAULT_BIND.to_string(),
            (host, port) => format!(
                "{}:{}",
                host.unwrap_or_else(|| "0.0.0.0".to_string()),
                port.unwrap_or_else(|| "3001".to_string())
            ),
        };
        let bind_addr = bind_addr.parse().map_err(|e| ConfigError::Invalid {
            name: "HOST/PORT",
            reason: format!("{e}"),
        })?;

        let public_base_url = parse_url("PUBLIC_BASE_URL", &require("PUBLIC_BASE_URL")?)?;
        let frontend_url = match get("FRONTEND_URL") {
            Some(v) => parse_url("FRONTEND_URL", &v)?,
            None => public_base_url.clone(),
        };

        let jwt_secret = require("SUPABASE_JWT_SECRET")?;
        let oauth_state_secret = get("OAUTH_STATE_SECRET").unwrap_or_else(|| jwt_secret.clone());

        let lookback_days = match get("SYNC_LOOKBACK_DAYS") {
            Some(v) => parse_ranged("SYNC_LOOKBACK_DAYS", &v, 1, Self::MAX_LOOKBACK_DAYS)?,
            None => Self::DEFAULT_LOOKBACK_DAYS,
        };
        let interval = get("SYNC_INTERVAL_MINUTES")
            .map(|v| parse_ranged("SYNC_INTERVAL_MINUTES", &v, 1, 7 * 24 * 60))
            .transpose()?
            .map(|minutes| Duration::from_secs(minutes as u64 * 60));

        let google = match (
            get("GOOGLE_ADS_CLIENT_ID"),
            get("GOOGLE_ADS_CLIENT_SECRET"),
            get("GOOGLE_ADS_DEVELOPER_TOKEN"),
        ) {
            (Some(client_id), Some(secret), Some(developer_token)) => Some(GoogleAdsConfig {
                client_id,
                client_secret: secret.into(),
                developer_token: developer_token.into(),
                login_customer_id: get("GOOGLE_ADS_LOGIN_CUSTOMER_ID")
                    .map(|id| id.replace('-', "")),
            }),
            _ => None,
        };

        let meta = match (get("META_APP_ID"), get("META_APP_SECRET")) {
            (Some(app_id), Some(secret)) => Some(MetaAdsConfig {
                app_id,
                app_secret: secret.into(),
            }),
            _ => None,
        };

        let linkedin = match (get("LINKEDIN_CLIENT_ID"), get("LINKEDIN_CLIENT_SECRET")) {
            (Some(client_id), Some(secret)) => Some(LinkedinAdsConfig {
                client_id,
                client_secret: secret.into(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: require("DATABASE_URL")?.into(),
            bind_addr,
            public_base_url,
            frontend_url,
            token_encryption_key: require("TOKEN_ENCRYPTION_KEY")?.into(),
            jwt_secret: jwt_secret.into(),
            oauth_state_secret: oauth_state_secret.into(),
            google,
            meta,
            linkedin,
            sync: SyncConfig {
                lookback_days,
                interval,
            },
            anthropic_api_key: get("ANTHROPIC_API_KEY").map(Into::into),
        })
    }

    /// Redirect URI registered with the provider for `platform`
    pub fn oauth_redirect_uri(&self, platform: AdPlatform) -> String {
        let base = self.public_base_url.as_str().trim_end_matches('/');
        format!("{}/api/oauth/{}/callback", base, platform)
    }

    pub fn platform_enabled(&self, platform: AdPlatform) -> bool {
        match platform {
            AdPlatform::Google => self.google.is_some(),
            AdPlatform::Meta => self.meta.is_some(),
            AdPlatform::Linkedin => self.linkedin.is_some(),
        }
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_ranged(name: &'static str, value: &str, min: i64, max: i64) -> Result<i64, ConfigError> {
    let parsed: i64 = value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("expected an integer, got {value:?}"),
    })?;
    if !(min..=max).contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be between {min} and {max}"),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/ads"),
            ("PUBLIC_BASE_URL", "https://api.example.com/"),
            ("TOKEN_ENCRYPTION_KEY", "00"),
            ("SUPABASE_JWT_SECRET", "jwt-secret"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.sync.lookback_days, 30);
        assert!(config.sync.interval.is_none());
        assert_eq!(config.oauth_state_secret.expose_secret(), "jwt-secret");
        assert_eq!(config.frontend_url, config.public_base_url);
        assert!(config.google.is_none() && config.meta.is_none() && config.linkedin.is_none());
    }

    #[test]
    fn test_missing_required_variable() {
        let mut env = base_env();
        env.remove("TOKEN_ENCRYPTION_KEY");
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing("TOKEN_ENCRYPTION_KEY"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("DATABASE_URL", "  ");
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_platform_requires_all_credentials() {
        let mut env = base_env();
        env.insert("GOOGLE_ADS_CLIENT_ID", "id");
        env.insert("GOOGLE_ADS_CLIENT_SECRET", "secret");
        let config = load(&env).unwrap();
        assert!(!config.platform_enabled(AdPlatform::Google));

        env.insert("GOOGLE_ADS_DEVELOPER_TOKEN", "dev");
        env.insert("GOOGLE_ADS_LOGIN_CUSTOMER_ID", "123-456-7890");
        let config = load(&env).unwrap();
        let google = config.google.unwrap();
        assert_eq!(google.login_customer_id.as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_sync_settings_are_validated() {
        let mut env = base_env();
        env.insert("SYNC_INTERVAL_MINUTES", "15");
        env.insert("SYNC_LOOKBACK_DAYS", "90");
        let config = load(&env).unwrap();
        assert_eq!(config.sync.interval, Some(Duration::from_secs(900)));
        assert_eq!(config.sync.lookback_days, 90);

        env.insert("SYNC_LOOKBACK_DAYS", "0");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Invalid { name: "SYNC_LOOKBACK_DAYS", .. }
        ));
    }

    #[test]
    fn test_redirect_uri_strips_trailing_slash() {
        let config = load(&base_env()).unwrap();
        assert_eq!(
            config.oauth_redirect_uri(AdPlatform::Linkedin),
            "https://api.example.com/api/oauth/linkedin/callback"
        );
    }
}
