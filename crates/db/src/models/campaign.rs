use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub external_id: String, // Provider campaign id (LinkedIn: campaign group)
    pub name: String,
    pub status: String,
    pub objective: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertCampaign {
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub objective: Option<String>,
}

impl Campaign {
    /// Insert or update by `(ad_account_id, external_id)`; returns the internal id
    pub async fn upsert(conn: &mut PgConnection, data: &UpsertCampaign) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO campaigns (tenant_id, ad_account_id, external_id, name, status, objective)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (ad_account_id, external_id) DO UPDATE SET
                   name = excluded.name,
                   status = excluded.status,
                   objective = excluded.objective,
                   updated_at = now()
               RETURNING id"#,
        )
        .bind(data.tenant_id)
        .bind(data.ad_account_id)
        .bind(&data.external_id)
        .bind(&data.name)
        .bind(&data.status)
        .bind(&data.objective)
        .fetch_one(conn)
        .await
    }

    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"SELECT id, tenant_id, ad_account_id, external_id, name, status, objective, created_at, updated_at
               FROM campaigns
               WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_ad_account(
        pool: &PgPool,
        ad_account_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"SELECT id, tenant_id, ad_account_id, external_id, name, status, objective, created_at, updated_at
               FROM campaigns
               WHERE ad_account_id = $1
               ORDER BY name"#,
        )
        .bind(ad_account_id)
        .fetch_all(pool)
        .await
    }
}
