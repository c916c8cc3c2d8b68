//! In-memory provider fakes and fixtures for tests that run against Postgres.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use db::models::{
    ad_account::{AdAccount, AdPlatform, ConnectAdAccount},
    metrics::MetricLevel,
    tenant::Tenant,
};
use sqlx::PgPool;
use utils::crypto::TokenCipher;

use super::{
    integrations::Integrations,
    oauth::{OAuthError, OAuthProvider, TokenGrant},
    platforms::{
        AccountRef, AdPlatformClient, DateRange, MetricRecord, PlatformError, RemoteAccount,
        RemoteAd, RemoteAdGroup, RemoteCampaign,
    },
    token_manager::TokenManager,
    token_vault::{TokenSet, TokenVault},
};

pub fn vault() -> TokenVault {
    TokenVault::new(TokenCipher::new(&[7u8; 32]).unwrap())
}

/// Refresh answers with `refreshed_token`, or with a reconnect error when unset
pub struct FakeOAuth {
    pub platform: AdPlatform,
    pub refreshed_token: Option<String>,
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn platform(&self) -> AdPlatform {
        self.platform
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        format!("https://auth.test/authorize?state={state}&redirect_uri={redirect_uri}")
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, OAuthError> {
        Ok(TokenGrant {
            access_token: format!("access-for-{code}").into(),
            refresh_token: Some("refresh-from-code".to_string().into()),
            expires_in: Some(3600),
        })
    }

    async fn refresh(&self, _tokens: &TokenSet) -> Result<TokenGrant, OAuthError> {
        match &self.refreshed_token {
            Some(token) => Ok(TokenGrant {
                access_token: token.clone().into(),
                refresh_token: None,
                expires_in: Some(3600),
            }),
            None => Err(OAuthError::ReconnectRequired("invalid_grant".into())),
        }
    }
}

/// Serves the same fixed hierarchy for every account, except the accounts
/// listed in `failures`, whose campaign fetch fails with the paired error.
#[derive(Default)]
pub struct FakeAdsClient {
    pub campaigns: Vec<RemoteCampaign>,
    pub ad_groups: Vec<RemoteAdGroup>,
    pub ads: Vec<RemoteAd>,
    pub metrics: Vec<MetricRecord>,
    pub failures: Vec<(String, PlatformError)>,
}

impl FakeAdsClient {
    /// Two campaigns, two ad groups (one orphaned), one ad, and metrics at
    /// every level plus one row for an entity the provider never listed.
    pub fn with_hierarchy(day: NaiveDate) -> Self {
        let metric = |level, id: &str| MetricRecord {
            level,
            external_id: id.into(),
            date: day,
            impressions: 1000,
            clicks: 50,
            conversions: 5.0,
            spend: 100.0,
            revenue: 400.0,
        };
        Self {
            campaigns: vec![
                RemoteCampaign {
                    external_id: "c1".into(),
                    name: "Brand".into(),
                    status: "ENABLED".into(),
                    objective: None,
                },
                RemoteCampaign {
                    external_id: "c2".into(),
                    name: "Retargeting".into(),
                    status: "PAUSED".into(),
                    objective: Some("SALES".into()),
                },
            ],
            ad_groups: vec![
                RemoteAdGroup {
                    external_id: "g1".into(),
                    campaign_external_id: "c1".into(),
                    name: "Exact match".into(),
                    status: "ENABLED".into(),
                },
                RemoteAdGroup {
                    external_id: "g-orphan".into(),
                    campaign_external_id: "c-removed".into(),
                    name: "Orphan".into(),
                    status: "ENABLED".into(),
                },
            ],
            ads: vec![RemoteAd {
                external_id: "a1".into(),
                ad_group_external_id: "g1".into(),
                name: "Headline A".into(),
                status: "ENABLED".into(),
                ad_type: Some("RESPONSIVE_SEARCH_AD".into()),
            }],
            metrics: vec![
                metric(MetricLevel::Campaign, "c1"),
                metric(MetricLevel::Campaign, "c2"),
                metric(MetricLevel::Campaign, "c-removed"),
                metric(MetricLevel::AdGroup, "g1"),
                metric(MetricLevel::Ad, "a1"),
            ],
            failures: Vec::new(),
        }
    }

    pub fn failing_for(mut self, external_account_id: &str, error: PlatformError) -> Self {
        self.failures.push((external_account_id.to_string(), error));
        self
    }
}

#[async_trait]
impl AdPlatformClient for FakeAdsClient {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Meta
    }

    async fn list_accounts(&self, _access_token: &str) -> Result<Vec<RemoteAccount>, PlatformError> {
        Ok(vec![RemoteAccount {
            external_id: "act_1".into(),
            name: "Shop".into(),
            currency: Some("EUR".into()),
            login_customer_id: None,
        }])
    }

    async fn fetch_campaigns(
        &self,
        _access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteCampaign>, PlatformError> {
        if let Some((_, error)) = self.failures.iter().find(|(id, _)| *id == account.external_id) {
            return Err(error.clone());
        }
        Ok(self.campaigns.clone())
    }

    async fn fetch_ad_groups(
        &self,
        _access_token: &str,
        _account: &AccountRef,
    ) -> Result<Vec<RemoteAdGroup>, PlatformError> {
        Ok(self.ad_groups.clone())
    }

    async fn fetch_ads(
        &self,
        _access_token: &str,
        _account: &AccountRef,
    ) -> Result<Vec<RemoteAd>, PlatformError> {
        Ok(self.ads.clone())
    }

    async fn fetch_metrics(
        &self,
        _access_token: &str,
        _account: &AccountRef,
        level: MetricLevel,
        _range: DateRange,
    ) -> Result<Vec<MetricRecord>, PlatformError> {
        Ok(self
            .metrics
            .iter()
            .filter(|m| m.level == level)
            .cloned()
            .collect())
    }
}

pub fn token_manager(pool: &PgPool, oauth: FakeOAuth, client: FakeAdsClient) -> TokenManager {
    let mut integrations = Integrations::default();
    integrations.insert(Arc::new(oauth), Arc::new(client));
    TokenManager::new(pool.clone(), vault(), integrations)
}

pub async fn tenant(pool: &PgPool) -> Tenant {
    Tenant::create(pool, "Acme Retail").await.unwrap()
}

/// A Meta account whose stored tokens are sealed with [`vault`]
pub async fn connected_account(
    pool: &PgPool,
    tenant_id: uuid::Uuid,
    external_account_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> AdAccount {
    let tokens = vault()
        .seal(&TokenSet {
            access_token: "stored-access".to_string().into(),
            refresh_token: Some("stored-refresh".to_string().into()),
            expires_at,
        })
        .unwrap();
    AdAccount::upsert_connection(
        pool,
        &ConnectAdAccount {
            tenant_id,
            connected_by: None,
            platform: AdPlatform::Meta,
            external_account_id: external_account_id.into(),
            account_name: format!("Account {external_account_id}"),
            currency: Some("EUR".into()),
            login_customer_id: None,
            tokens,
        },
    )
    .await
    .unwrap()
}
