use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::ad_account::AdPlatform;

/// Hierarchy level a daily metrics row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricLevel {
    Campaign,
    AdGroup,
    Ad,
}

impl MetricLevel {
    pub const ALL: [MetricLevel; 3] = [MetricLevel::Campaign, MetricLevel::AdGroup, MetricLevel::Ad];

    fn upsert_sql(&self) -> &'static str {
        match self {
            MetricLevel::Campaign => {
                r#"INSERT INTO campaign_metrics (campaign_id, date, impressions, clicks, conversions, spend, revenue)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (campaign_id, date) DO UPDATE SET
                       impressions = excluded.impressions,
                       clicks = excluded.clicks,
                       conversions = excluded.conversions,
                       spend = excluded.spend,
                       revenue = excluded.revenue,
                       updated_at = now()"#
            }
            MetricLevel::AdGroup => {
                r#"INSERT INTO ad_group_metrics (ad_group_id, date, impressions, clicks, conversions, spend, revenue)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (ad_group_id, date) DO UPDATE SET
                       impressions = excluded.impressions,
                       clicks = excluded.clicks,
                       conversions = excluded.conversions,
                       spend = excluded.spend,
                       revenue = excluded.revenue,
                       updated_at = now()"#
            }
            MetricLevel::Ad => {
                r#"INSERT INTO ad_metrics (ad_id, date, impressions, clicks, conversions, spend, revenue)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)
                   ON CONFLICT (ad_id, date) DO UPDATE SET
                       impressions = excluded.impressions,
                       clicks = excluded.clicks,
                       conversions = excluded.conversions,
                       spend = excluded.spend,
                       revenue = excluded.revenue,
                       updated_at = now()"#
            }
        }
    }
}

/// One day of performance for a single entity at some level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub entity_id: Uuid,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub spend: f64,
    pub revenue: f64,
}

impl DailyMetric {
    /// Overwrites any row for the same entity and date
    pub async fn upsert(
        conn: &mut PgConnection,
        level: MetricLevel,
        metric: &DailyMetric,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(level.upsert_sql())
            .bind(metric.entity_id)
            .bind(metric.date)
            .bind(metric.impressions)
            .bind(metric.clicks)
            .bind(metric.conversions)
            .bind(metric.spend)
            .bind(metric.revenue)
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Dashboard query scope
#[derive(Debug, Clone)]
pub struct MetricsFilter {
    pub tenant_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub platform: Option<AdPlatform>,
    pub ad_account_id: Option<Uuid>,
}

/// Campaign-level daily row joined with its campaign and account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CampaignMetricRow {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub campaign_status: String,
    pub ad_account_id: Uuid,
    pub account_name: String,
    pub platform: AdPlatform,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub spend: f64,
    pub revenue: f64,
}

/// Daily row for a single ad group or ad
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct EntityMetricRow {
    pub entity_id: Uuid,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub spend: f64,
    pub revenue: f64,
}

impl CampaignMetricRow {
    pub async fn find(pool: &PgPool, filter: &MetricsFilter) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CampaignMetricRow>(
            r#"SELECT
                c.id            AS campaign_id,
                c.name          AS campaign_name,
                c.status        AS campaign_status,
                a.id            AS ad_account_id,
                a.account_name  AS account_name,
                a.platform      AS platform,
                m.date,
                m.impressions,
                m.clicks,
                m.conversions,
                m.spend,
                m.revenue
            FROM campaign_metrics m
            JOIN campaigns c ON c.id = m.campaign_id
            JOIN ad_accounts a ON a.id = c.ad_account_id
            WHERE c.tenant_id = $1
              AND m.date BETWEEN $2 AND $3
              AND ($4::ad_platform IS NULL OR a.platform = $4)
              AND ($5::uuid IS NULL OR a.id = $5)
            ORDER BY m.date, c.name"#,
        )
        .bind(filter.tenant_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.platform)
        .bind(filter.ad_account_id)
        .fetch_all(pool)
        .await
    }
}

impl EntityMetricRow {
    pub async fn find_for_ad_groups_of_campaign(
        pool: &PgPool,
        campaign_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EntityMetricRow>(
            r#"SELECT m.ad_group_id AS entity_id, m.date, m.impressions, m.clicks, m.conversions, m.spend, m.revenue
               FROM ad_group_metrics m
               JOIN ad_groups g ON g.id = m.ad_group_id
               WHERE g.campaign_id = $1 AND m.date BETWEEN $2 AND $3
               ORDER BY m.date"#,
        )
        .bind(campaign_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    pub async fn find_for_ads_of_ad_group(
        pool: &PgPool,
        ad_group_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EntityMetricRow>(
            r#"SELECT m.ad_id AS entity_id, m.date, m.impressions, m.clicks, m.conversions, m.spend, m.revenue
               FROM ad_metrics m
               JOIN ads d ON d.id = m.ad_id
               WHERE d.ad_group_id = $1 AND m.date BETWEEN $2 AND $3
               ORDER BY m.date"#,
        )
        .bind(ad_group_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }
}
