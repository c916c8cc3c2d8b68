//! Registry of the OAuth provider and API client for each enabled platform.

use std::{collections::HashMap, sync::Arc};

use db::models::ad_account::AdPlatform;
use tracing::info;

use super::{
    config::Config,
    oauth::{
        OAuthError, OAuthProvider, google::GoogleOAuth, linkedin::LinkedinOAuth, meta::MetaOAuth,
    },
    platforms::{
        AdPlatformClient, google_ads::GoogleAdsClient, linkedin_ads::LinkedinAdsClient,
        meta_ads::MetaAdsClient,
    },
};

#[derive(Clone)]
pub struct Integration {
    pub oauth: Arc<dyn OAuthProvider>,
    pub client: Arc<dyn AdPlatformClient>,
}

#[derive(Clone, Default)]
pub struct Integrations {
    by_platform: HashMap<AdPlatform, Integration>,
}

impl Integrations {
    /// Build clients for every platform that has credentials configured
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut integrations = Self::default();

        if let Some(google) = &config.google {
            integrations.insert(
                Arc::new(GoogleOAuth::new(google.clone())?),
                Arc::new(GoogleAdsClient::new(google)?),
            );
        }
        if let Some(meta) = &config.meta {
            integrations.insert(
                Arc::new(MetaOAuth::new(meta.clone())?),
                Arc::new(MetaAdsClient::new()?),
            );
        }
        if let Some(linkedin) = &config.linkedin {
            integrations.insert(
                Arc::new(LinkedinOAuth::new(linkedin.clone())?),
                Arc::new(LinkedinAdsClient::new()?),
            );
        }

        info!(
            platforms = ?integrations.platforms(),
            "Ad platform integrations ready"
        );
        Ok(integrations)
    }

    /// Register a platform. Both halves must be for the same platform.
    pub fn insert(&mut self, oauth: Arc<dyn OAuthProvider>, client: Arc<dyn AdPlatformClient>) {
        debug_assert_eq!(oauth.platform(), client.platform());
        self.by_platform
            .insert(client.platform(), Integration { oauth, client });
    }

    pub fn get(&self, platform: AdPlatform) -> Result<&Integration, OAuthError> {
        self.by_platform
            .get(&platform)
            .ok_or(OAuthError::NotConfigured(platform))
    }

    pub fn oauth(&self, platform: AdPlatform) -> Result<Arc<dyn OAuthProvider>, OAuthError> {
        Ok(self.get(platform)?.oauth.clone())
    }

    pub fn client(&self, platform: AdPlatform) -> Result<Arc<dyn AdPlatformClient>, OAuthError> {
        Ok(self.get(platform)?.client.clone())
    }

    pub fn is_enabled(&self, platform: AdPlatform) -> bool {
        self.by_platform.contains_key(&platform)
    }

    /// Enabled platforms in a stable order
    pub fn platforms(&self) -> Vec<AdPlatform> {
        AdPlatform::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }
}

impl std::fmt::Debug for Integrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrations")
            .field("platforms", &self.platforms())
            .finish()
    }
}
