//! Shared application state handed to every route.

use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use secrecy::ExposeSecret;
use services::services::{
    analytics::AnalyticsService, anthropic::AnthropicClient, assistant::AssistantService,
    config::Config, integrations::Integrations, reports::ReportService, sync::SyncService,
    token_manager::TokenManager, token_vault::TokenVault,
};
use tracing::info;

struct Inner {
    config: Config,
    db: DBService,
    tokens: TokenManager,
    sync: SyncService,
    analytics: AnalyticsService,
    reports: ReportService,
    assistant: AssistantService,
}

#[derive(Clone)]
pub struct Deployment {
    inner: Arc<Inner>,
}

impl Deployment {
    /// Connect to the database, run migrations and wire up services
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = DBService::new(config.database_url.expose_secret())
            .await
            .context("failed to connect to database")?;
        Self::with_db(config, db)
    }

    /// Wire up services on an existing database handle
    pub fn with_db(config: Config, db: DBService) -> anyhow::Result<Self> {
        let vault = TokenVault::from_hex_key(config.token_encryption_key.expose_secret())
            .context("TOKEN_ENCRYPTION_KEY")?;
        let integrations = Integrations::from_config(&config)?;
        let tokens = TokenManager::new(db.pool.clone(), vault, integrations);
        let sync = SyncService::new(db.pool.clone(), tokens.clone(), config.sync.lookback_days);
        let analytics = AnalyticsService::new(db.pool.clone());
        let reports = ReportService::new(analytics.clone());

        let anthropic = config
            .anthropic_api_key
            .clone()
            .map(|key| AnthropicClient::new(key, None))
            .transpose()?;
        if anthropic.is_none() {
            info!("Assistant disabled (ANTHROPIC_API_KEY not set)");
        }
        let assistant = AssistantService::new(anthropic, analytics.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                db,
                tokens,
                sync,
                analytics,
                reports,
                assistant,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn db(&self) -> &DBService {
        &self.inner.db
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    pub fn integrations(&self) -> &Integrations {
        self.inner.tokens.integrations()
    }

    pub fn sync(&self) -> &SyncService {
        &self.inner.sync
    }

    pub fn analytics(&self) -> &AnalyticsService {
        &self.inner.analytics
    }

    pub fn reports(&self) -> &ReportService {
        &self.inner.reports
    }

    pub fn assistant(&self) -> &AssistantService {
        &self.inner.assistant
    }
}
