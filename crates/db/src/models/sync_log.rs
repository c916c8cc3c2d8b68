use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Succeeded,
    Failed,
}

/// One sync run of one ad account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SyncLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub status: SyncStatus,
    pub campaigns_synced: i32,
    pub ad_groups_synced: i32,
    pub ads_synced: i32,
    pub metric_rows_synced: i32,
    pub skipped_rows: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Row counts written by a sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct SyncCounts {
    pub campaigns: i32,
    pub ad_groups: i32,
    pub ads: i32,
    pub metric_rows: i32,
    /// Rows dropped because their parent or entity was unknown
    pub skipped: i32,
}

const SYNC_LOG_COLUMNS: &str = r#"
    id, tenant_id, ad_account_id, status, campaigns_synced, ad_groups_synced, ads_synced,
    metric_rows_synced, skipped_rows, error_message, started_at, finished_at"#;

impl SyncLog {
    pub async fn start(
        pool: &PgPool,
        tenant_id: Uuid,
        ad_account_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"INSERT INTO sync_logs (id, tenant_id, ad_account_id, status)
               VALUES ($1, $2, $3, 'running')
               RETURNING {SYNC_LOG_COLUMNS}"#
        );
        sqlx::query_as::<_, SyncLog>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(ad_account_id)
            .fetch_one(pool)
            .await
    }

    pub async fn finish_success(
        pool: &PgPool,
        id: Uuid,
        counts: &SyncCounts,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE sync_logs
               SET status = 'succeeded',
                   campaigns_synced = $2,
                   ad_groups_synced = $3,
                   ads_synced = $4,
                   metric_rows_synced = $5,
                   skipped_rows = $6,
                   finished_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(counts.campaigns)
        .bind(counts.ad_groups)
        .bind(counts.ads)
        .bind(counts.metric_rows)
        .bind(counts.skipped)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Partial counts are kept so a failed run shows how far it got
    pub async fn finish_failure(
        pool: &PgPool,
        id: Uuid,
        counts: &SyncCounts,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE sync_logs
               SET status = 'failed',
                   campaigns_synced = $2,
                   ad_groups_synced = $3,
                   ads_synced = $4,
                   metric_rows_synced = $5,
                   skipped_rows = $6,
                   error_message = $7,
                   finished_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(counts.campaigns)
        .bind(counts.ad_groups)
        .bind(counts.ads)
        .bind(counts.metric_rows)
        .bind(counts.skipped)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_ad_account(
        pool: &PgPool,
        ad_account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"SELECT {SYNC_LOG_COLUMNS}
               FROM sync_logs
               WHERE ad_account_id = $1
               ORDER BY started_at DESC
               LIMIT $2"#
        );
        sqlx::query_as::<_, SyncLog>(&sql)
            .bind(ad_account_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
