use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use ts_rs::TS;
use uuid::Uuid;

/// Ad group (Meta: ad set, LinkedIn: campaign)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AdGroup {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub campaign_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertAdGroup {
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub campaign_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
}

impl AdGroup {
    pub async fn upsert(conn: &mut PgConnection, data: &UpsertAdGroup) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO ad_groups (tenant_id, ad_account_id, campaign_id, external_id, name, status)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (ad_account_id, external_id) DO UPDATE SET
                   campaign_id = excluded.campaign_id,
                   name = excluded.name,
                   status = excluded.status,
                   updated_at = now()
               RETURNING id"#,
        )
        .bind(data.tenant_id)
        .bind(data.ad_account_id)
        .bind(data.campaign_id)
        .bind(&data.external_id)
        .bind(&data.name)
        .bind(&data.status)
        .fetch_one(conn)
        .await
    }

    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AdGroup>(
            r#"SELECT id, tenant_id, ad_account_id, campaign_id, external_id, name, status, created_at, updated_at
               FROM ad_groups
               WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_campaign(
        pool: &PgPool,
        campaign_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AdGroup>(
            r#"SELECT id, tenant_id, ad_account_id, campaign_id, external_id, name, status, created_at, updated_at
               FROM ad_groups
               WHERE campaign_id = $1
               ORDER BY name"#,
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await
    }
}
