use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use ts_rs::TS;
use uuid::Uuid;

/// Ad (LinkedIn: creative)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Ad {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub ad_group_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub ad_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertAd {
    pub tenant_id: Uuid,
    pub ad_account_id: Uuid,
    pub ad_group_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub ad_type: Option<String>,
}

impl Ad {
    pub async fn upsert(conn: &mut PgConnection, data: &UpsertAd) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO ads (tenant_id, ad_account_id, ad_group_id, external_id, name, status, ad_type)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (ad_account_id, external_id) DO UPDATE SET
                   ad_group_id = excluded.ad_group_id,
                   name = excluded.name,
                   status = excluded.status,
                   ad_type = excluded.ad_type,
                   updated_at = now()
               RETURNING id"#,
        )
        .bind(data.tenant_id)
        .bind(data.ad_account_id)
        .bind(data.ad_group_id)
        .bind(&data.external_id)
        .bind(&data.name)
        .bind(&data.status)
        .bind(&data.ad_type)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_ad_group(
        pool: &PgPool,
        ad_group_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ad>(
            r#"SELECT id, tenant_id, ad_account_id, ad_group_id, external_id, name, status, ad_type, created_at, updated_at
               FROM ads
               WHERE ad_group_id = $1
               ORDER BY name"#,
        )
        .bind(ad_group_id)
        .fetch_all(pool)
        .await
    }
}
