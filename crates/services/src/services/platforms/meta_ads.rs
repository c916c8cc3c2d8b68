//! Meta Marketing API (Graph) client.

use async_trait::async_trait;
use db::models::{ad_account::AdPlatform, metrics::MetricLevel};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{
    AccountRef, AdPlatformClient, DateRange, MAX_PAGES, MetricRecord, PlatformError,
    RemoteAccount, RemoteAd, RemoteAdGroup, RemoteCampaign, de_f64_lenient, de_i64_lenient,
    http_client, map_reqwest_error, parse_date, read_json,
};
use crate::services::oauth::meta::GRAPH_API_VERSION;

const GRAPH_BASE: &str = "https://graph.facebook.com";
const PAGE_LIMIT: &str = "500";

/// Purchase action types in order of preference. The first one present on a
/// row is used so the same purchase is never counted twice.
const CONVERSION_ACTION_TYPES: [&str; 3] = [
    "omni_purchase",
    "purchase",
    "offsite_conversion.fb_pixel_purchase",
];

#[derive(Debug, Clone)]
pub struct MetaAdsClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphAdAccount {
    id: String,
    account_id: Option<String>,
    name: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphCampaign {
    id: String,
    name: Option<String>,
    status: Option<String>,
    objective: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphAdSet {
    id: String,
    campaign_id: String,
    name: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphAd {
    id: String,
    adset_id: String,
    name: Option<String>,
    status: Option<String>,
    creative: Option<GraphCreative>,
}

#[derive(Debug, Deserialize)]
struct GraphCreative {
    object_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightRow {
    campaign_id: Option<String>,
    adset_id: Option<String>,
    ad_id: Option<String>,
    date_start: String,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    impressions: i64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    clicks: i64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    spend: f64,
    #[serde(default)]
    actions: Vec<ActionValue>,
    #[serde(default)]
    action_values: Vec<ActionValue>,
}

#[derive(Debug, Deserialize)]
struct ActionValue {
    action_type: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    value: f64,
}

impl MetaAdsClient {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            http: http_client()?,
        })
    }

    /// GET a Graph edge and follow `paging.next` until exhausted
    async fn get_all<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, PlatformError> {
        let url = format!("{GRAPH_BASE}/{GRAPH_API_VERSION}/{path}");
        let first = self
            .http
            .get(&url)
            .query(params)
            .query(&[("access_token", access_token), ("limit", PAGE_LIMIT)]);

        let mut items = Vec::new();
        let mut page: Page<T> = send(first).await?;
        for n in 1..=MAX_PAGES {
            items.extend(page.data);
            let Some(next) = page.paging.and_then(|p| p.next) else {
                debug!(path, pages = n, items = items.len(), "Graph edge complete");
                return Ok(items);
            };
            page = send(self.http.get(next)).await?;
        }

        items.extend(page.data);
        warn!(path, "Graph paging hit page limit");
        Ok(items)
    }
}

async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, PlatformError> {
    let res = request.send().await.map_err(map_reqwest_error)?;
    read_json(res).await.map_err(classify_graph_error)
}

/// Graph reports most failures as HTTP 400 with an error code in the body
fn classify_graph_error(err: PlatformError) -> PlatformError {
    let PlatformError::Http { status, body } = &err else {
        return err;
    };
    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("code")?.as_i64());
    match code {
        Some(190) => PlatformError::Unauthorized,
        // application, user, ad account and business use case throttling
        Some(4 | 17 | 32 | 613 | 80000..=80014) => PlatformError::RateLimited,
        _ => {
            debug!(status, ?code, "Graph request failed");
            err
        }
    }
}

/// `act_123` and `123` both address ad account 123
fn act_path(external_id: &str) -> String {
    format!("act_{}", external_id.trim_start_matches("act_"))
}

fn insights_params(level: MetricLevel, range: DateRange) -> Vec<(&'static str, String)> {
    let level_name = match level {
        MetricLevel::Campaign => "campaign",
        MetricLevel::AdGroup => "adset",
        MetricLevel::Ad => "ad",
    };
    let time_range = serde_json::json!({
        "since": range.from.format("%Y-%m-%d").to_string(),
        "until": range.to.format("%Y-%m-%d").to_string(),
    });
    vec![
        ("level", level_name.to_string()),
        (
            "fields",
            "campaign_id,adset_id,ad_id,impressions,clicks,spend,actions,action_values,date_start"
                .to_string(),
        ),
        ("time_increment", "1".to_string()),
        ("time_range", time_range.to_string()),
    ]
}

fn first_purchase_value(values: &[ActionValue]) -> f64 {
    CONVERSION_ACTION_TYPES
        .iter()
        .find_map(|wanted| values.iter().find(|a| a.action_type == *wanted))
        .map(|a| a.value)
        .unwrap_or(0.0)
}

fn metric_from_insight(level: MetricLevel, row: InsightRow) -> Result<Option<MetricRecord>, PlatformError> {
    let external_id = match level {
        MetricLevel::Campaign => row.campaign_id,
        MetricLevel::AdGroup => row.adset_id,
        MetricLevel::Ad => row.ad_id,
    };
    let Some(external_id) = external_id else {
        return Ok(None);
    };

    Ok(Some(MetricRecord {
        level,
        external_id,
        date: parse_date(&row.date_start)?,
        impressions: row.impressions,
        clicks: row.clicks,
        conversions: first_purchase_value(&row.actions),
        spend: row.spend,
        revenue: first_purchase_value(&row.action_values),
    }))
}

fn account_from_graph(account: GraphAdAccount) -> RemoteAccount {
    let external_id = account
        .account_id
        .unwrap_or_else(|| account.id.trim_start_matches("act_").to_string());
    RemoteAccount {
        name: account
            .name
            .unwrap_or_else(|| format!("Meta ad account {external_id}")),
        external_id,
        currency: account.currency,
        login_customer_id: None,
    }
}

#[async_trait]
impl AdPlatformClient for MetaAdsClient {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Meta
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, PlatformError> {
        let accounts: Vec<GraphAdAccount> = self
            .get_all(
                access_token,
                "me/adaccounts",
                &[("fields", "id,account_id,name,currency".to_string())],
            )
            .await?;
        Ok(accounts.into_iter().map(account_from_graph).collect())
    }

    async fn fetch_campaigns(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteCampaign>, PlatformError> {
        let path = format!("{}/campaigns", act_path(&account.external_id));
        let campaigns: Vec<GraphCampaign> = self
            .get_all(
                access_token,
                &path,
                &[("fields", "id,name,status,objective".to_string())],
            )
            .await?;
        Ok(campaigns
            .into_iter()
            .map(|c| RemoteCampaign {
                name: c.name.unwrap_or_else(|| c.id.clone()),
                external_id: c.id,
                status: c.status.unwrap_or_else(|| "UNKNOWN".into()),
                objective: c.objective,
            })
            .collect())
    }

    async fn fetch_ad_groups(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAdGroup>, PlatformError> {
        let path = format!("{}/adsets", act_path(&account.external_id));
        let ad_sets: Vec<GraphAdSet> = self
            .get_all(
                access_token,
                &path,
                &[("fields", "id,name,status,campaign_id".to_string())],
            )
            .await?;
        Ok(ad_sets
            .into_iter()
            .map(|s| RemoteAdGroup {
                name: s.name.unwrap_or_else(|| s.id.clone()),
                external_id: s.id,
                campaign_external_id: s.campaign_id,
                status: s.status.unwrap_or_else(|| "UNKNOWN".into()),
            })
            .collect())
    }

    async fn fetch_ads(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAd>, PlatformError> {
        let path = format!("{}/ads", act_path(&account.external_id));
        let ads: Vec<GraphAd> = self
            .get_all(
                access_token,
                &path,
                &[(
                    "fields",
                    "id,name,status,adset_id,creative{object_type}".to_string(),
                )],
            )
            .await?;
        Ok(ads
            .into_iter()
            .map(|a| RemoteAd {
                name: a.name.unwrap_or_else(|| format!("Ad {}", a.id)),
                external_id: a.id,
                ad_group_external_id: a.adset_id,
                status: a.status.unwrap_or_else(|| "UNKNOWN".into()),
                ad_type: a.creative.and_then(|c| c.object_type),
            })
            .collect())
    }

    async fn fetch_metrics(
        &self,
        access_token: &str,
        account: &AccountRef,
        level: MetricLevel,
        range: DateRange,
    ) -> Result<Vec<MetricRecord>, PlatformError> {
        let path = format!("{}/insights", act_path(&account.external_id));
        let rows: Vec<InsightRow> = self
            .get_all(access_token, &path, &insights_params(level, range))
            .await?;
        rows.into_iter()
            .filter_map(|row| metric_from_insight(level, row).transpose())
            .collect()
    }
}
