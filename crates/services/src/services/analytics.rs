//! Metric reductions and dashboard view models.

use std::{collections::HashMap, iter::Sum, ops::Add};

use chrono::{Duration, NaiveDate};
use db::models::{
    ad::Ad,
    ad_account::AdPlatform,
    ad_group::AdGroup,
    campaign::Campaign,
    metrics::{CampaignMetricRow, EntityMetricRow, MetricsFilter},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::platforms::DateRange;

/// Window used when a dashboard request gives no dates
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
/// Longest window a dashboard, report or chat request may ask for
pub const MAX_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid date range: from {from} is after to {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("date window of {days} days exceeds the maximum of {max}")]
    WindowTooLong { days: i64, max: i64 },
    #[error("date {0} is out of range")]
    DateOutOfRange(NaiveDate),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Summed raw metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct MetricTotals {
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub spend: f64,
    pub revenue: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl MetricTotals {
    /// Click-through rate in percent
    pub fn ctr(&self) -> f64 {
        ratio(self.clicks as f64, self.impressions as f64) * 100.0
    }

    pub fn cpc(&self) -> f64 {
        ratio(self.spend, self.clicks as f64)
    }

    pub fn cpa(&self) -> f64 {
        ratio(self.spend, self.conversions)
    }

    pub fn roas(&self) -> f64 {
        ratio(self.revenue, self.spend)
    }

    /// Conversions per click in percent
    pub fn conversion_rate(&self) -> f64 {
        ratio(self.conversions, self.clicks as f64) * 100.0
    }
}

impl Add for MetricTotals {
    type Output = MetricTotals;

    fn add(self, other: MetricTotals) -> MetricTotals {
        MetricTotals {
            impressions: self.impressions + other.impressions,
            clicks: self.clicks + other.clicks,
            conversions: self.conversions + other.conversions,
            spend: self.spend + other.spend,
            revenue: self.revenue + other.revenue,
        }
    }
}

impl Sum for MetricTotals {
    fn sum<I: Iterator<Item = MetricTotals>>(iter: I) -> Self {
        iter.fold(MetricTotals::default(), Add::add)
    }
}

impl From<&CampaignMetricRow> for MetricTotals {
    fn from(row: &CampaignMetricRow) -> Self {
        MetricTotals {
            impressions: row.impressions,
            clicks: row.clicks,
            conversions: row.conversions,
            spend: row.spend,
            revenue: row.revenue,
        }
    }
}

impl From<&EntityMetricRow> for MetricTotals {
    fn from(row: &EntityMetricRow) -> Self {
        MetricTotals {
            impressions: row.impressions,
            clicks: row.clicks,
            conversions: row.conversions,
            spend: row.spend,
            revenue: row.revenue,
        }
    }
}

/// Totals plus derived ratios, as served to the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, TS)]
pub struct Performance {
    #[serde(flatten)]
    pub totals: MetricTotals,
    pub ctr: f64,
    pub cpc: f64,
    pub cpa: f64,
    pub roas: f64,
    pub conversion_rate: f64,
}

impl From<MetricTotals> for Performance {
    fn from(totals: MetricTotals) -> Self {
        Performance {
            ctr: totals.ctr(),
            cpc: totals.cpc(),
            cpa: totals.cpa(),
            roas: totals.roas(),
            conversion_rate: totals.conversion_rate(),
            totals,
        }
    }
}

/// Percent change from `previous` to `current`; undefined from zero
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, TS)]
pub struct MetricChanges {
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub conversions: Option<f64>,
    pub spend: Option<f64>,
    pub revenue: Option<f64>,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
}

impl MetricChanges {
    pub fn between(current: &MetricTotals, previous: &MetricTotals) -> Self {
        MetricChanges {
            impressions: percent_change(current.impressions as f64, previous.impressions as f64),
            clicks: percent_change(current.clicks as f64, previous.clicks as f64),
            conversions: percent_change(current.conversions, previous.conversions),
            spend: percent_change(current.spend, previous.spend),
            revenue: percent_change(current.revenue, previous.revenue),
            ctr: percent_change(current.ctr(), previous.ctr()),
            cpc: percent_change(current.cpc(), previous.cpc()),
            cpa: percent_change(current.cpa(), previous.cpa()),
            roas: percent_change(current.roas(), previous.roas()),
        }
    }
}

/// The `days` days ending on `to`, failing instead of overflowing
fn window_ending(to: NaiveDate, days: i64) -> Result<DateRange, AnalyticsError> {
    to.checked_sub_signed(Duration::days(days - 1))
        .map(|from| DateRange { from, to })
        .ok_or(AnalyticsError::DateOutOfRange(to))
}

/// The window of equal length immediately before `range`
pub fn previous_window(range: DateRange) -> Result<DateRange, AnalyticsError> {
    let to = range
        .from
        .checked_sub_signed(Duration::days(1))
        .ok_or(AnalyticsError::DateOutOfRange(range.from))?;
    window_ending(to, range.days())
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct PlatformBreakdown {
    pub platform: AdPlatform,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct AccountBreakdown {
    pub ad_account_id: Uuid,
    pub account_name: String,
    pub platform: AdPlatform,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct CampaignBreakdown {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub campaign_status: String,
    pub ad_account_id: Uuid,
    pub account_name: String,
    pub platform: AdPlatform,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub performance: Performance,
}

pub fn total(rows: &[CampaignMetricRow]) -> MetricTotals {
    rows.iter().map(MetricTotals::from).sum()
}

/// One entry per platform with data, in platform order
pub fn by_platform(rows: &[CampaignMetricRow]) -> Vec<PlatformBreakdown> {
    let mut sums: HashMap<AdPlatform, MetricTotals> = HashMap::new();
    for row in rows {
        let sum = sums.entry(row.platform).or_default();
        *sum = *sum + MetricTotals::from(row);
    }
    AdPlatform::ALL
        .into_iter()
        .filter_map(|platform| {
            sums.get(&platform).map(|totals| PlatformBreakdown {
                platform,
                performance: (*totals).into(),
            })
        })
        .collect()
}

fn by_spend_desc(a: &Performance, b: &Performance) -> std::cmp::Ordering {
    b.totals.spend.total_cmp(&a.totals.spend)
}

/// Highest spend first
pub fn by_account(rows: &[CampaignMetricRow]) -> Vec<AccountBreakdown> {
    let mut accounts: HashMap<Uuid, AccountBreakdown> = HashMap::new();
    for row in rows {
        let entry = accounts
            .entry(row.ad_account_id)
            .or_insert_with(|| AccountBreakdown {
                ad_account_id: row.ad_account_id,
                account_name: row.account_name.clone(),
                platform: row.platform,
                performance: Performance::default(),
            });
        entry.performance.totals = entry.performance.totals + MetricTotals::from(row);
    }
    let mut accounts: Vec<_> = accounts
        .into_values()
        .map(|mut a| {
            a.performance = a.performance.totals.into();
            a
        })
        .collect();
    accounts.sort_by(|a, b| {
        by_spend_desc(&a.performance, &b.performance).then_with(|| a.account_name.cmp(&b.account_name))
    });
    accounts
}

/// Highest spend first, ties by name
pub fn by_campaign(rows: &[CampaignMetricRow]) -> Vec<CampaignBreakdown> {
    let mut campaigns: HashMap<Uuid, CampaignBreakdown> = HashMap::new();
    for row in rows {
        let entry = campaigns
            .entry(row.campaign_id)
            .or_insert_with(|| CampaignBreakdown {
                campaign_id: row.campaign_id,
                campaign_name: row.campaign_name.clone(),
                campaign_status: row.campaign_status.clone(),
                ad_account_id: row.ad_account_id,
                account_name: row.account_name.clone(),
                platform: row.platform,
                performance: Performance::default(),
            });
        entry.performance.totals = entry.performance.totals + MetricTotals::from(row);
    }
    let mut campaigns: Vec<_> = campaigns
        .into_values()
        .map(|mut c| {
            c.performance = c.performance.totals.into();
            c
        })
        .collect();
    campaigns.sort_by(|a, b| {
        by_spend_desc(&a.performance, &b.performance)
            .then_with(|| a.campaign_name.cmp(&b.campaign_name))
    });
    campaigns
}

/// Daily totals for every day of `range`, zero-filled where there is no data
pub fn daily_series(rows: &[CampaignMetricRow], range: DateRange) -> Vec<DailyPoint> {
    let mut by_date: HashMap<NaiveDate, MetricTotals> = HashMap::new();
    for row in rows {
        let sum = by_date.entry(row.date).or_default();
        *sum = *sum + MetricTotals::from(row);
    }
    range
        .from
        .iter_days()
        .take_while(|d| *d <= range.to)
        .map(|date| DailyPoint {
            date,
            performance: by_date.get(&date).copied().unwrap_or_default().into(),
        })
        .collect()
}

fn totals_by_entity(rows: &[EntityMetricRow]) -> HashMap<Uuid, MetricTotals> {
    let mut sums: HashMap<Uuid, MetricTotals> = HashMap::new();
    for row in rows {
        let sum = sums.entry(row.entity_id).or_default();
        *sum = *sum + MetricTotals::from(row);
    }
    sums
}

/// Dashboard query parameters
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct DashboardQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub platform: Option<AdPlatform>,
    pub account_id: Option<Uuid>,
}

impl DashboardQuery {
    /// Resolve the window; missing ends default to a 30 day window ending today.
    /// Windows longer than [`MAX_WINDOW_DAYS`] are rejected.
    pub fn range(&self, today: NaiveDate) -> Result<DateRange, AnalyticsError> {
        let range = match (self.from, self.to) {
            (Some(from), Some(to)) => DateRange { from, to },
            (Some(from), None) => DateRange { from, to: today },
            (None, Some(to)) => window_ending(to, DEFAULT_WINDOW_DAYS)?,
            (None, None) => window_ending(today, DEFAULT_WINDOW_DAYS)?,
        };
        if range.from > range.to {
            return Err(AnalyticsError::InvalidRange {
                from: range.from,
                to: range.to,
            });
        }
        let days = range.days();
        if days > MAX_WINDOW_DAYS {
            return Err(AnalyticsError::WindowTooLong {
                days,
                max: MAX_WINDOW_DAYS,
            });
        }
        Ok(range)
    }

    fn filter(&self, tenant_id: Uuid, range: DateRange) -> MetricsFilter {
        MetricsFilter {
            tenant_id,
            from: range.from,
            to: range.to,
            platform: self.platform,
            ad_account_id: self.account_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct DashboardSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub performance: Performance,
    pub previous: Performance,
    pub change: MetricChanges,
    pub platforms: Vec<PlatformBreakdown>,
    pub accounts: Vec<AccountBreakdown>,
}

pub fn summarize(
    range: DateRange,
    current: &[CampaignMetricRow],
    previous: &[CampaignMetricRow],
) -> DashboardSummary {
    let current_totals = total(current);
    let previous_totals = total(previous);
    DashboardSummary {
        from: range.from,
        to: range.to,
        performance: current_totals.into(),
        previous: previous_totals.into(),
        change: MetricChanges::between(&current_totals, &previous_totals),
        platforms: by_platform(current),
        accounts: by_account(current),
    }
}

/// Ad group or ad with its totals for a window
#[derive(Debug, Clone, Serialize, TS)]
pub struct EntityPerformance {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub performance: Performance,
}

#[derive(Debug, Clone)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn campaign_rows(
        &self,
        tenant_id: Uuid,
        query: &DashboardQuery,
        range: DateRange,
    ) -> Result<Vec<CampaignMetricRow>, AnalyticsError> {
        Ok(CampaignMetricRow::find(&self.pool, &query.filter(tenant_id, range)).await?)
    }

    pub async fn summary(
        &self,
        tenant_id: Uuid,
        query: &DashboardQuery,
        today: NaiveDate,
    ) -> Result<DashboardSummary, AnalyticsError> {
        let range = query.range(today)?;
        let current = self.campaign_rows(tenant_id, query, range).await?;
        let previous = self
            .campaign_rows(tenant_id, query, previous_window(range)?)
            .await?;
        Ok(summarize(range, &current, &previous))
    }

    pub async fn campaigns(
        &self,
        tenant_id: Uuid,
        query: &DashboardQuery,
        today: NaiveDate,
    ) -> Result<Vec<CampaignBreakdown>, AnalyticsError> {
        let range = query.range(today)?;
        let rows = self.campaign_rows(tenant_id, query, range).await?;
        Ok(by_campaign(&rows))
    }

    pub async fn timeseries(
        &self,
        tenant_id: Uuid,
        query: &DashboardQuery,
        today: NaiveDate,
    ) -> Result<Vec<DailyPoint>, AnalyticsError> {
        let range = query.range(today)?;
        let rows = self.campaign_rows(tenant_id, query, range).await?;
        Ok(daily_series(&rows, range))
    }

    pub async fn ad_groups_of_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<EntityPerformance>, AnalyticsError> {
        Campaign::find_for_tenant(&self.pool, tenant_id, campaign_id)
            .await?
            .ok_or(AnalyticsError::NotFound("campaign"))?;
        let groups = AdGroup::find_by_campaign(&self.pool, campaign_id).await?;
        let rows = EntityMetricRow::find_for_ad_groups_of_campaign(
            &self.pool,
            campaign_id,
            range.from,
            range.to,
        )
        .await?;
        let totals = totals_by_entity(&rows);

        let mut entities: Vec<_> = groups
            .into_iter()
            .map(|g| EntityPerformance {
                performance: totals.get(&g.id).copied().unwrap_or_default().into(),
                id: g.id,
                external_id: g.external_id,
                name: g.name,
                status: g.status,
            })
            .collect();
        entities.sort_by(|a, b| by_spend_desc(&a.performance, &b.performance));
        Ok(entities)
    }

    pub async fn ads_of_ad_group(
        &self,
        tenant_id: Uuid,
        ad_group_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<EntityPerformance>, AnalyticsError> {
        AdGroup::find_for_tenant(&self.pool, tenant_id, ad_group_id)
            .await?
            .ok_or(AnalyticsError::NotFound("ad group"))?;
        let ads = Ad::find_by_ad_group(&self.pool, ad_group_id).await?;
        let rows =
            EntityMetricRow::find_for_ads_of_ad_group(&self.pool, ad_group_id, range.from, range.to)
                .await?;
        let totals = totals_by_entity(&rows);

        let mut entities: Vec<_> = ads
            .into_iter()
            .map(|a| EntityPerformance {
                performance: totals.get(&a.id).copied().unwrap_or_default().into(),
                id: a.id,
                external_id: a.external_id,
                name: a.name,
                status: a.status,
            })
            .collect();
        entities.sort_by(|a, b| by_spend_desc(&a.performance, &b.performance));
        Ok(entities)
    }
}
