//! Fetch-transform-upsert of one ad account's structure and daily metrics.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use db::models::{
    ad::{Ad, UpsertAd},
    ad_account::{AdAccount, AdAccountStatus, AdPlatform},
    ad_group::{AdGroup, UpsertAdGroup},
    campaign::{Campaign, UpsertCampaign},
    metrics::{DailyMetric, MetricLevel},
    sync_log::{SyncCounts, SyncLog},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    platforms::{AccountRef, AdPlatformClient, DateRange, MetricRecord, PlatformError},
    token_manager::{TokenError, TokenManager},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ad account not found")]
    AccountNotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    /// Account status to record when a sync fails with this error
    pub fn account_status(&self) -> AdAccountStatus {
        let reconnect = match self {
            SyncError::Token(e) => e.requires_reconnect(),
            SyncError::Platform(e) => *e == PlatformError::Unauthorized,
            _ => false,
        };
        if reconnect {
            AdAccountStatus::Expired
        } else {
            AdAccountStatus::Error
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct SyncReport {
    pub ad_account_id: Uuid,
    pub sync_log_id: Uuid,
    pub platform: AdPlatform,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub counts: SyncCounts,
}

/// Result of one account within a tenant-wide sync
#[derive(Debug, Clone, Serialize, TS)]
pub struct SyncOutcome {
    pub ad_account_id: Uuid,
    pub account_name: String,
    pub platform: AdPlatform,
    pub success: bool,
    pub counts: Option<SyncCounts>,
    pub error: Option<String>,
}

/// Rows whose parent resolved to an internal id, and how many did not
#[derive(Debug)]
struct Resolved<T> {
    rows: Vec<(Uuid, T)>,
    skipped: usize,
}

fn resolve_parents<T>(
    items: Vec<T>,
    parent_ids: &HashMap<String, Uuid>,
    parent_of: impl Fn(&T) -> &str,
) -> Resolved<T> {
    let mut rows = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match parent_ids.get(parent_of(&item)) {
            Some(id) => rows.push((*id, item)),
            None => skipped += 1,
        }
    }
    Resolved { rows, skipped }
}

/// Map provider metric rows onto internal entity ids; rows for entities
/// that were not synced are dropped and counted.
fn resolve_metrics(
    records: Vec<MetricRecord>,
    entity_ids: &HashMap<String, Uuid>,
) -> (Vec<DailyMetric>, usize) {
    let resolved = resolve_parents(records, entity_ids, |r| r.external_id.as_str());
    let metrics = resolved
        .rows
        .into_iter()
        .map(|(entity_id, r)| DailyMetric {
            entity_id,
            date: r.date,
            impressions: r.impressions,
            clicks: r.clicks,
            conversions: r.conversions,
            spend: r.spend,
            revenue: r.revenue,
        })
        .collect();
    (metrics, resolved.skipped)
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone)]
pub struct SyncService {
    pool: PgPool,
    tokens: TokenManager,
    lookback_days: i64,
}

impl SyncService {
    pub fn new(pool: PgPool, tokens: TokenManager, lookback_days: i64) -> Self {
        Self {
            pool,
            tokens,
            lookback_days,
        }
    }

    /// Sync one account of `tenant_id`
    pub async fn sync_account(
        &self,
        tenant_id: Uuid,
        ad_account_id: Uuid,
    ) -> Result<SyncReport, SyncError> {
        let account = AdAccount::find_for_tenant(&self.pool, tenant_id, ad_account_id)
            .await?
            .ok_or(SyncError::AccountNotFound)?;
        self.run(&account).await
    }

    /// Sync every syncable account of a tenant, one after another
    pub async fn sync_tenant(&self, tenant_id: Uuid) -> Result<Vec<SyncOutcome>, SyncError> {
        let accounts = AdAccount::find_syncable_for_tenant(&self.pool, tenant_id).await?;
        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in &accounts {
            outcomes.push(self.outcome(account).await);
        }
        Ok(outcomes)
    }

    /// Sync every syncable account across tenants
    pub async fn sync_all(&self) -> Result<Vec<SyncOutcome>, SyncError> {
        let accounts = AdAccount::find_all_syncable(&self.pool).await?;
        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in &accounts {
            outcomes.push(self.outcome(account).await);
        }
        Ok(outcomes)
    }

    /// Run the first sync of freshly connected accounts in the background
    pub fn spawn_initial_sync(&self, accounts: Vec<AdAccount>) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            for account in &accounts {
                if let Err(e) = service.run(account).await {
                    warn!(ad_account_id = %account.id, error = %e, "Initial sync failed");
                }
            }
        })
    }

    async fn outcome(&self, account: &AdAccount) -> SyncOutcome {
        let result = self.run(account).await;
        SyncOutcome {
            ad_account_id: account.id,
            account_name: account.account_name.clone(),
            platform: account.platform,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            counts: result.ok().map(|r| r.counts),
        }
    }

    async fn run(&self, account: &AdAccount) -> Result<SyncReport, SyncError> {
        let log = SyncLog::start(&self.pool, account.tenant_id, account.id).await?;
        let range = DateRange::trailing(Utc::now().date_naive(), self.lookback_days);
        let mut counts = SyncCounts::default();

        info!(
            ad_account_id = %account.id,
            platform = %account.platform,
            from = %range.from,
            to = %range.to,
            "Starting account sync"
        );

        match self.sync_inner(account, range, &mut counts).await {
            Ok(()) => {
                SyncLog::finish_success(&self.pool, log.id, &counts).await?;
                AdAccount::mark_synced(&self.pool, account.id).await?;
                info!(
                    ad_account_id = %account.id,
                    campaigns = counts.campaigns,
                    ad_groups = counts.ad_groups,
                    ads = counts.ads,
                    metric_rows = counts.metric_rows,
                    skipped = counts.skipped,
                    "Account sync finished"
                );
                Ok(SyncReport {
                    ad_account_id: account.id,
                    sync_log_id: log.id,
                    platform: account.platform,
                    from: range.from,
                    to: range.to,
                    counts,
                })
            }
            Err(e) => {
                let message = e.to_string();
                error!(ad_account_id = %account.id, error = %message, "Account sync failed");
                if let Err(db_err) =
                    SyncLog::finish_failure(&self.pool, log.id, &counts, &message).await
                {
                    error!(sync_log_id = %log.id, error = %db_err, "Failed to record sync failure");
                }
                if let Err(db_err) =
                    AdAccount::mark_sync_failed(&self.pool, account.id, e.account_status(), &message)
                        .await
                {
                    error!(ad_account_id = %account.id, error = %db_err, "Failed to record account status");
                }
                Err(e)
            }
        }
    }

    async fn sync_inner(
        &self,
        account: &AdAccount,
        range: DateRange,
        counts: &mut SyncCounts,
    ) -> Result<(), SyncError> {
        let token = self.tokens.access_token(account).await?;
        let token = token.expose_secret();
        let client = self
            .tokens
            .integrations()
            .client(account.platform)
            .map_err(TokenError::from)?;
        let account_ref = AccountRef {
            external_id: account.external_account_id.clone(),
            login_customer_id: account.login_customer_id.clone(),
        };

        let campaign_ids = self
            .sync_campaigns(client.as_ref(), token, account, &account_ref, counts)
            .await?;
        let ad_group_ids = self
            .sync_ad_groups(client.as_ref(), token, account, &account_ref, &campaign_ids, counts)
            .await?;
        let ad_ids = self
            .sync_ads(client.as_ref(), token, account, &account_ref, &ad_group_ids, counts)
            .await?;

        for level in MetricLevel::ALL {
            let entity_ids = match level {
                MetricLevel::Campaign => &campaign_ids,
                MetricLevel::AdGroup => &ad_group_ids,
                MetricLevel::Ad => &ad_ids,
            };
            let records = client
                .fetch_metrics(token, &account_ref, level, range)
                .await?;
            let (metrics, skipped) = resolve_metrics(records, entity_ids);

            let mut tx = self.pool.begin().await?;
            for metric in &metrics {
                DailyMetric::upsert(&mut tx, level, metric).await?;
            }
            tx.commit().await?;

            debug!(%level, rows = metrics.len(), skipped, "Upserted metrics");
            counts.metric_rows += count(metrics.len());
            counts.skipped += count(skipped);
        }

        Ok(())
    }

    async fn sync_campaigns(
        &self,
        client: &dyn AdPlatformClient,
        token: &str,
        account: &AdAccount,
        account_ref: &AccountRef,
        counts: &mut SyncCounts,
    ) -> Result<HashMap<String, Uuid>, SyncError> {
        let campaigns = client.fetch_campaigns(token, account_ref).await?;
        let mut ids = HashMap::with_capacity(campaigns.len());

        let mut tx = self.pool.begin().await?;
        for campaign in campaigns {
            let id = Campaign::upsert(
                &mut tx,
                &UpsertCampaign {
                    tenant_id: account.tenant_id,
                    ad_account_id: account.id,
                    external_id: campaign.external_id.clone(),
                    name: campaign.name,
                    status: campaign.status,
                    objective: campaign.objective,
                },
            )
            .await?;
            ids.insert(campaign.external_id, id);
        }
        tx.commit().await?;

        counts.campaigns = count(ids.len());
        Ok(ids)
    }

    async fn sync_ad_groups(
        &self,
        client: &dyn AdPlatformClient,
        token: &str,
        account: &AdAccount,
        account_ref: &AccountRef,
        campaign_ids: &HashMap<String, Uuid>,
        counts: &mut SyncCounts,
    ) -> Result<HashMap<String, Uuid>, SyncError> {
        let ad_groups = client.fetch_ad_groups(token, account_ref).await?;
        let resolved = resolve_parents(ad_groups, campaign_ids, |g| g.campaign_external_id.as_str());
        if resolved.skipped > 0 {
            warn!(ad_account_id = %account.id, skipped = resolved.skipped, "Ad groups with unknown campaign");
        }
        let mut ids = HashMap::with_capacity(resolved.rows.len());

        let mut tx = self.pool.begin().await?;
        for (campaign_id, group) in resolved.rows {
            let id = AdGroup::upsert(
                &mut tx,
                &UpsertAdGroup {
                    tenant_id: account.tenant_id,
                    ad_account_id: account.id,
                    campaign_id,
                    external_id: group.external_id.clone(),
                    name: group.name,
                    status: group.status,
                },
            )
            .await?;
            ids.insert(group.external_id, id);
        }
        tx.commit().await?;

        counts.ad_groups = count(ids.len());
        counts.skipped += count(resolved.skipped);
        Ok(ids)
    }

    async fn sync_ads(
        &self,
        client: &dyn AdPlatformClient,
        token: &str,
        account: &AdAccount,
        account_ref: &AccountRef,
        ad_group_ids: &HashMap<String, Uuid>,
        counts: &mut SyncCounts,
    ) -> Result<HashMap<String, Uuid>, SyncError> {
        let ads = client.fetch_ads(token, account_ref).await?;
        let resolved = resolve_parents(ads, ad_group_ids, |a| a.ad_group_external_id.as_str());
        if resolved.skipped > 0 {
            warn!(ad_account_id = %account.id, skipped = resolved.skipped, "Ads with unknown ad group");
        }
        let mut ids = HashMap::with_capacity(resolved.rows.len());

        let mut tx = self.pool.begin().await?;
        for (ad_group_id, ad) in resolved.rows {
            let id = Ad::upsert(
                &mut tx,
                &UpsertAd {
                    tenant_id: account.tenant_id,
                    ad_account_id: account.id,
                    ad_group_id,
                    external_id: ad.external_id.clone(),
                    name: ad.name,
                    status: ad.status,
                    ad_type: ad.ad_type,
                },
            )
            .await?;
            ids.insert(ad.external_id, id);
        }
        tx.commit().await?;

        counts.ads = count(ids.len());
        counts.skipped += count(resolved.skipped);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use db::models::sync_log::SyncStatus;

    use super::*;
    use crate::services::{
        oauth::OAuthError,
        platforms::RemoteAdGroup,
        test_support::{FakeAdsClient, FakeOAuth, connected_account, tenant, token_manager},
    };

    fn group(id: &str, campaign: &str) -> RemoteAdGroup {
        RemoteAdGroup {
            external_id: id.into(),
            campaign_external_id: campaign.into(),
            name: format!("Group {id}"),
            status: "ENABLED".into(),
        }
    }

    fn record(id: &str, day: u32) -> MetricRecord {
        MetricRecord {
            level: MetricLevel::Campaign,
            external_id: id.into(),
            date: NaiveDate::from_ymd_opt(2026, 5, day).unwrap(),
            impressions: 100,
            clicks: 10,
            conversions: 1.0,
            spend: 20.0,
            revenue: 80.0,
        }
    }

    #[test]
    fn test_children_of_unknown_parents_are_skipped() {
        let known = Uuid::new_v4();
        let campaign_ids = HashMap::from([("c1".to_string(), known)]);
        let resolved = resolve_parents(
            vec![group("g1", "c1"), group("g2", "c-missing"), group("g3", "c1")],
            &campaign_ids,
            |g| g.campaign_external_id.as_str(),
        );
        assert_eq!(resolved.skipped, 1);
        let ids: Vec<_> = resolved.rows.iter().map(|(p, g)| (*p, g.external_id.as_str())).collect();
        assert_eq!(ids, vec![(known, "g1"), (known, "g3")]);
    }

    #[test]
    fn test_metrics_resolve_to_internal_ids() {
        let internal = Uuid::new_v4();
        let ids = HashMap::from([("42".to_string(), internal)]);
        let (metrics, skipped) = resolve_metrics(vec![record("42", 1), record("43", 1), record("42", 2)], &ids);
        assert_eq!(skipped, 1);
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|m| m.entity_id == internal));
        assert_eq!(metrics[1].date, NaiveDate::from_ymd_opt(2026, 5, 2).unwrap());
        assert_eq!(metrics[0].revenue, 80.0);
    }

    #[test]
    fn test_failure_status() {
        assert_eq!(
            SyncError::Token(TokenError::OAuth(OAuthError::ReconnectRequired("revoked".into())))
                .account_status(),
            AdAccountStatus::Expired
        );
        assert_eq!(
            SyncError::Platform(PlatformError::Unauthorized).account_status(),
            AdAccountStatus::Expired
        );
        assert_eq!(
            SyncError::Platform(PlatformError::RateLimited).account_status(),
            AdAccountStatus::Error
        );
        assert_eq!(
            SyncError::Token(TokenError::OAuth(OAuthError::Transport("reset".into()))).account_status(),
            AdAccountStatus::Error
        );
    }

    #[test]
    fn test_count_saturates() {
        assert_eq!(count(3), 3);
        assert_eq!(count(usize::MAX), i32::MAX);
    }

    async fn table_count(pool: &PgPool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn service(pool: &PgPool, client: FakeAdsClient) -> SyncService {
        let oauth = FakeOAuth {
            platform: AdPlatform::Meta,
            refreshed_token: Some("fresh".into()),
        };
        SyncService::new(pool.clone(), token_manager(pool, oauth, client), 30)
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn test_resync_is_idempotent(pool: PgPool) {
        let today = Utc::now().date_naive();
        let tenant = tenant(&pool).await;
        let account = connected_account(&pool, tenant.id, "act_1", None).await;
        let sync = service(&pool, FakeAdsClient::with_hierarchy(today));

        let first = sync.sync_account(tenant.id, account.id).await.unwrap();
        assert_eq!(
            first.counts,
            SyncCounts {
                campaigns: 2,
                ad_groups: 1,
                ads: 1,
                metric_rows: 4,
                skipped: 2,
            }
        );

        let second = sync.sync_account(tenant.id, account.id).await.unwrap();
        assert_eq!(second.counts, first.counts);
        assert_ne!(second.sync_log_id, first.sync_log_id);

        assert_eq!(table_count(&pool, "campaigns").await, 2);
        assert_eq!(table_count(&pool, "ad_groups").await, 1);
        assert_eq!(table_count(&pool, "ads").await, 1);
        assert_eq!(table_count(&pool, "campaign_metrics").await, 2);
        assert_eq!(table_count(&pool, "ad_group_metrics").await, 1);
        assert_eq!(table_count(&pool, "ad_metrics").await, 1);

        let stored = AdAccount::find_by_id(&pool, account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AdAccountStatus::Active);
        assert!(stored.last_synced_at.is_some());
        assert!(stored.last_sync_error.is_none());

        let logs = SyncLog::find_by_ad_account(&pool, account.id, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == SyncStatus::Succeeded && l.finished_at.is_some()));
        assert_eq!(logs[0].skipped_rows, 2);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn test_tenant_sync_continues_past_failed_accounts(pool: PgPool) {
        let today = Utc::now().date_naive();
        let tenant = tenant(&pool).await;
        let broken = connected_account(&pool, tenant.id, "act_broken", None).await;
        let revoked = connected_account(&pool, tenant.id, "act_revoked", None).await;
        let healthy = connected_account(&pool, tenant.id, "act_ok", None).await;
        let client = FakeAdsClient::with_hierarchy(today)
            .failing_for("act_broken", PlatformError::Http { status: 500, body: "oops".into() })
            .failing_for("act_revoked", PlatformError::Unauthorized);
        let sync = service(&pool, client);

        let outcomes = sync.sync_tenant(tenant.id).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        let outcome = |id: Uuid| outcomes.iter().find(|o| o.ad_account_id == id).unwrap();
        assert!(!outcome(broken.id).success);
        assert!(outcome(broken.id).error.as_deref().unwrap().contains("oops"));
        assert!(!outcome(revoked.id).success);
        assert!(outcome(healthy.id).success);
        assert_eq!(outcome(healthy.id).counts.unwrap().campaigns, 2);

        let broken = AdAccount::find_by_id(&pool, broken.id).await.unwrap().unwrap();
        assert_eq!(broken.status, AdAccountStatus::Error);
        assert!(broken.last_sync_error.unwrap().contains("oops"));
        assert!(broken.last_synced_at.is_none());

        let revoked = AdAccount::find_by_id(&pool, revoked.id).await.unwrap().unwrap();
        assert_eq!(revoked.status, AdAccountStatus::Expired);

        let logs = SyncLog::find_by_ad_account(&pool, broken.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SyncStatus::Failed);
        assert!(logs[0].finished_at.is_some());
        assert!(logs[0].error_message.as_deref().unwrap().contains("oops"));

        // Expired accounts wait for a reconnect and are left out of the next pass
        let next = sync.sync_tenant(tenant.id).await.unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|o| o.ad_account_id != revoked.id));
    }
}
