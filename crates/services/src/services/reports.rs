//! Report data assembled from the same reductions as the dashboard.

use chrono::{DateTime, NaiveDate, Utc};
use db::models::{ad_account::AdPlatform, metrics::CampaignMetricRow};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    analytics::{
        AnalyticsError, AnalyticsService, CampaignBreakdown, DailyPoint, DashboardQuery,
        MetricChanges, Performance, PlatformBreakdown, by_campaign, by_platform, daily_series,
        previous_window, total,
    },
    platforms::DateRange,
};

pub const DEFAULT_TOP_CAMPAIGNS: usize = 10;
const MAX_TOP_CAMPAIGNS: usize = 100;

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub platform: Option<AdPlatform>,
    pub account_id: Option<Uuid>,
    pub top: Option<usize>,
}

impl ReportQuery {
    fn dashboard_query(&self) -> DashboardQuery {
        DashboardQuery {
            from: self.from,
            to: self.to,
            platform: self.platform,
            account_id: self.account_id,
        }
    }

    fn top(&self) -> usize {
        self.top
            .unwrap_or(DEFAULT_TOP_CAMPAIGNS)
            .clamp(1, MAX_TOP_CAMPAIGNS)
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct Report {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub platform: Option<AdPlatform>,
    pub performance: Performance,
    pub change: MetricChanges,
    pub platforms: Vec<PlatformBreakdown>,
    pub top_campaigns: Vec<CampaignBreakdown>,
    /// Campaigns with data beyond `top_campaigns`
    pub other_campaigns: usize,
    pub daily: Vec<DailyPoint>,
}

fn report_title(platform: Option<AdPlatform>, range: DateRange) -> String {
    let scope = platform.map_or("All platforms", |p| p.display_name());
    format!(
        "{scope} performance, {} to {}",
        range.from.format("%b %-d, %Y"),
        range.to.format("%b %-d, %Y")
    )
}

pub fn build_report(
    range: DateRange,
    platform: Option<AdPlatform>,
    top: usize,
    current: &[CampaignMetricRow],
    previous: &[CampaignMetricRow],
    generated_at: DateTime<Utc>,
) -> Report {
    let current_totals = total(current);
    let mut campaigns = by_campaign(current);
    let other_campaigns = campaigns.len().saturating_sub(top);
    campaigns.truncate(top);

    Report {
        title: report_title(platform, range),
        generated_at,
        from: range.from,
        to: range.to,
        platform,
        performance: current_totals.into(),
        change: MetricChanges::between(&current_totals, &total(previous)),
        platforms: by_platform(current),
        top_campaigns: campaigns,
        other_campaigns,
        daily: daily_series(current, range),
    }
}

#[derive(Debug, Clone)]
pub struct ReportService {
    analytics: AnalyticsService,
}

impl ReportService {
    pub fn new(analytics: AnalyticsService) -> Self {
        Self { analytics }
    }

    pub async fn generate(
        &self,
        tenant_id: Uuid,
        query: &ReportQuery,
        now: DateTime<Utc>,
    ) -> Result<Report, AnalyticsError> {
        let dashboard = query.dashboard_query();
        let range = dashboard.range(now.date_naive())?;
        let current = self.analytics.campaign_rows(tenant_id, &dashboard, range).await?;
        let previous = self
            .analytics
            .campaign_rows(tenant_id, &dashboard, previous_window(range)?)
            .await?;
        Ok(build_report(
            range,
            query.platform,
            query.top(),
            &current,
            &previous,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn row(name: &str, spend: f64) -> CampaignMetricRow {
        CampaignMetricRow {
            campaign_id: Uuid::new_v4(),
            campaign_name: name.into(),
            campaign_status: "ACTIVE".into(),
            ad_account_id: Uuid::nil(),
            account_name: "Main".into(),
            platform: AdPlatform::Google,
            date: day(2),
            impressions: 1000,
            clicks: 20,
            conversions: 2.0,
            spend,
            revenue: spend * 3.0,
        }
    }

    #[test]
    fn test_report_keeps_top_campaigns_by_spend() {
        let rows = vec![row("Small", 5.0), row("Big", 500.0), row("Mid", 50.0)];
        let range = DateRange { from: day(1), to: day(3) };
        let report = build_report(range, Some(AdPlatform::Google), 2, &rows, &[], Utc::now());

        let names: Vec<_> = report.top_campaigns.iter().map(|c| c.campaign_name.as_str()).collect();
        assert_eq!(names, vec!["Big", "Mid"]);
        assert_eq!(report.other_campaigns, 1);
        assert_eq!(report.performance.totals.spend, 555.0);
        assert_eq!(report.performance.roas, 3.0);
        assert_eq!(report.daily.len(), 3);
        assert_eq!(report.change.spend, None);
        assert_eq!(report.title, "Google Ads performance, Jul 1, 2026 to Jul 3, 2026");
    }

    #[test]
    fn test_top_is_clamped() {
        let query = ReportQuery {
            top: Some(0),
            ..Default::default()
        };
        assert_eq!(query.top(), 1);
        assert_eq!(ReportQuery::default().top(), DEFAULT_TOP_CAMPAIGNS);
        let query = ReportQuery {
            top: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.top(), MAX_TOP_CAMPAIGNS);
    }
}
