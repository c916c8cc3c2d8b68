//! Google Ads REST (`googleAds:search`) client.

use async_trait::async_trait;
use db::models::{ad_account::AdPlatform, metrics::MetricLevel};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AccountRef, AdPlatformClient, DateRange, MAX_PAGES, MetricRecord, PlatformError,
    RemoteAccount, RemoteAd, RemoteAdGroup, RemoteCampaign, de_f64_lenient, de_i64_lenient,
    de_id, http_client, map_reqwest_error, parse_date, read_json,
};
use crate::services::config::GoogleAdsConfig;

pub const API_VERSION: &str = "v18";
const API_BASE: &str = "https://googleads.googleapis.com";
const MICROS_PER_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
pub struct GoogleAdsClient {
    http: Client,
    developer_token: SecretString,
    default_login_customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<GoogleAdsRow>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccessibleCustomersResponse {
    #[serde(default)]
    resource_names: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAdsRow {
    customer: Option<CustomerResource>,
    campaign: Option<CampaignResource>,
    ad_group: Option<AdGroupResource>,
    ad_group_ad: Option<AdGroupAdResource>,
    metrics: Option<MetricsResource>,
    segments: Option<SegmentsResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerResource {
    #[serde(deserialize_with = "de_id")]
    id: String,
    descriptive_name: Option<String>,
    currency_code: Option<String>,
    #[serde(default)]
    manager: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignResource {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    status: Option<String>,
    advertising_channel_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdGroupResource {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdGroupAdResource {
    ad: AdResource,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdResource {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    ad_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResource {
    #[serde(default, deserialize_with = "de_i64_lenient")]
    impressions: i64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    clicks: i64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    conversions: f64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    cost_micros: i64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    conversions_value: f64,
}

#[derive(Debug, Deserialize)]
struct SegmentsResource {
    date: String,
}

impl GoogleAdsClient {
    pub fn new(config: &GoogleAdsConfig) -> Result<Self, PlatformError> {
        Ok(Self {
            http: http_client()?,
            developer_token: config.developer_token.clone(),
            default_login_customer_id: config.login_customer_id.clone(),
        })
    }

    fn authorized(
        &self,
        request: RequestBuilder,
        access_token: &str,
        login_customer_id: Option<&str>,
    ) -> RequestBuilder {
        let request = request
            .bearer_auth(access_token)
            .header("developer-token", self.developer_token.expose_secret());
        match login_customer_id.or(self.default_login_customer_id.as_deref()) {
            Some(login) => request.header("login-customer-id", login),
            None => request,
        }
    }

    /// Run a GAQL query and follow `nextPageToken` to the end
    async fn search(
        &self,
        access_token: &str,
        customer_id: &str,
        login_customer_id: Option<&str>,
        query: &str,
    ) -> Result<Vec<GoogleAdsRow>, PlatformError> {
        let url = format!("{API_BASE}/{API_VERSION}/customers/{customer_id}/googleAds:search");
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let body = SearchRequest {
                query,
                page_token: page_token.as_deref(),
            };
            let request = self.authorized(self.http.post(&url), access_token, login_customer_id);
            let res = request.json(&body).send().await.map_err(map_reqwest_error)?;
            let response: SearchResponse = read_json(res).await?;
            rows.extend(response.results);

            match response.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    debug!(customer_id, pages = page + 1, rows = rows.len(), "Google Ads search complete");
                    return Ok(rows);
                }
            }
        }

        warn!(customer_id, "Google Ads search hit page limit");
        Ok(rows)
    }
}

#[async_trait]
impl AdPlatformClient for GoogleAdsClient {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Google
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, PlatformError> {
        let url = format!("{API_BASE}/{API_VERSION}/customers:listAccessibleCustomers");
        let res = self
            .authorized(self.http.get(&url), access_token, None)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let listed: ListAccessibleCustomersResponse = read_json(res).await?;

        let mut accounts = Vec::new();
        for resource_name in listed.resource_names {
            let Some(customer_id) = customer_id_from_resource(&resource_name) else {
                continue;
            };
            let rows = match self
                .search(access_token, customer_id, None, CUSTOMER_QUERY)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(customer_id, error = %e, "Skipping inaccessible Google Ads customer");
                    continue;
                }
            };
            accounts.extend(rows.into_iter().filter_map(account_from_row));
        }
        Ok(accounts)
    }

    async fn fetch_campaigns(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteCampaign>, PlatformError> {
        let rows = self
            .search(
                access_token,
                &account.external_id,
                account.login_customer_id.as_deref(),
                CAMPAIGN_QUERY,
            )
            .await?;
        Ok(rows.into_iter().filter_map(campaign_from_row).collect())
    }

    async fn fetch_ad_groups(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAdGroup>, PlatformError> {
        let rows = self
            .search(
                access_token,
                &account.external_id,
                account.login_customer_id.as_deref(),
                AD_GROUP_QUERY,
            )
            .await?;
        Ok(rows.into_iter().filter_map(ad_group_from_row).collect())
    }

    async fn fetch_ads(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAd>, PlatformError> {
        let rows = self
            .search(
                access_token,
                &account.external_id,
                account.login_customer_id.as_deref(),
                AD_QUERY,
            )
            .await?;
        Ok(rows.into_iter().filter_map(ad_from_row).collect())
    }

    async fn fetch_metrics(
        &self,
        access_token: &str,
        account: &AccountRef,
        level: MetricLevel,
        range: DateRange,
    ) -> Result<Vec<MetricRecord>, PlatformError> {
        let query = metrics_query(level, range);
        let rows = self
            .search(
                access_token,
                &account.external_id,
                account.login_customer_id.as_deref(),
                &query,
            )
            .await?;
        rows.into_iter()
            .filter_map(|row| metric_from_row(level, row).transpose())
            .collect()
    }
}

const CUSTOMER_QUERY: &str = "SELECT customer.id, customer.descriptive_name, customer.currency_code, customer.manager FROM customer LIMIT 1";

const CAMPAIGN_QUERY: &str = "SELECT campaign.id, campaign.name, campaign.status, campaign.advertising_channel_type FROM campaign WHERE campaign.status != 'REMOVED'";

const AD_GROUP_QUERY: &str = "SELECT ad_group.id, ad_group.name, ad_group.status, campaign.id FROM ad_group WHERE ad_group.status != 'REMOVED'";

const AD_QUERY: &str = "SELECT ad_group_ad.ad.id, ad_group_ad.ad.name, ad_group_ad.ad.type, ad_group_ad.status, ad_group.id FROM ad_group_ad WHERE ad_group_ad.status != 'REMOVED'";

fn metrics_query(level: MetricLevel, range: DateRange) -> String {
    let (id_field, resource) = match level {
        MetricLevel::Campaign => ("campaign.id", "campaign"),
        MetricLevel::AdGroup => ("ad_group.id", "ad_group"),
        MetricLevel::Ad => ("ad_group.id, ad_group_ad.ad.id", "ad_group_ad"),
    };
    format!(
        "SELECT {id_field}, segments.date, metrics.impressions, metrics.clicks, \
         metrics.conversions, metrics.cost_micros, metrics.conversions_value \
         FROM {resource} WHERE segments.date BETWEEN '{}' AND '{}'",
        range.from.format("%Y-%m-%d"),
        range.to.format("%Y-%m-%d"),
    )
}

/// Ad ids are only unique within their ad group, so ads are keyed the way
/// the `adGroupAds/{ad_group_id}~{ad_id}` resource name does.
fn ad_key(ad_group_id: &str, ad_id: &str) -> String {
    format!("{ad_group_id}~{ad_id}")
}

/// `customers/1234567890` -> `1234567890`
fn customer_id_from_resource(resource_name: &str) -> Option<&str> {
    resource_name
        .strip_prefix("customers/")
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}

fn account_from_row(row: GoogleAdsRow) -> Option<RemoteAccount> {
    let customer = row.customer?;
    if customer.manager {
        return None;
    }
    Some(RemoteAccount {
        name: customer
            .descriptive_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Google Ads {}", customer.id)),
        external_id: customer.id,
        currency: customer.currency_code,
        login_customer_id: None,
    })
}

fn campaign_from_row(row: GoogleAdsRow) -> Option<RemoteCampaign> {
    let campaign = row.campaign?;
    Some(RemoteCampaign {
        name: campaign.name.unwrap_or_else(|| campaign.id.clone()),
        external_id: campaign.id,
        status: campaign.status.unwrap_or_else(|| "UNKNOWN".into()),
        objective: campaign.advertising_channel_type,
    })
}

fn ad_group_from_row(row: GoogleAdsRow) -> Option<RemoteAdGroup> {
    let ad_group = row.ad_group?;
    let campaign = row.campaign?;
    Some(RemoteAdGroup {
        name: ad_group.name.unwrap_or_else(|| ad_group.id.clone()),
        external_id: ad_group.id,
        campaign_external_id: campaign.id,
        status: ad_group.status.unwrap_or_else(|| "UNKNOWN".into()),
    })
}

fn ad_from_row(row: GoogleAdsRow) -> Option<RemoteAd> {
    let ad_group_ad = row.ad_group_ad?;
    let ad_group = row.ad_group?;
    let ad = ad_group_ad.ad;
    Some(RemoteAd {
        name: ad
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Ad {}", ad.id)),
        external_id: ad_key(&ad_group.id, &ad.id),
        ad_group_external_id: ad_group.id,
        status: ad_group_ad.status.unwrap_or_else(|| "UNKNOWN".into()),
        ad_type: ad.ad_type,
    })
}

/// Rows without an entity id for `level` are dropped; a bad date is an error
fn metric_from_row(level: MetricLevel, row: GoogleAdsRow) -> Result<Option<MetricRecord>, PlatformError> {
    let external_id = match level {
        MetricLevel::Campaign => row.campaign.map(|c| c.id),
        MetricLevel::AdGroup => row.ad_group.map(|g| g.id),
        MetricLevel::Ad => row
            .ad_group
            .zip(row.ad_group_ad)
            .map(|(group, a)| ad_key(&group.id, &a.ad.id)),
    };
    let (Some(external_id), Some(segments)) = (external_id, row.segments) else {
        return Ok(None);
    };
    let metrics = row.metrics.unwrap_or_default();

    Ok(Some(MetricRecord {
        level,
        external_id,
        date: parse_date(&segments.date)?,
        impressions: metrics.impressions,
        clicks: metrics.clicks,
        conversions: metrics.conversions,
        spend: metrics.cost_micros as f64 / MICROS_PER_UNIT,
        revenue: metrics.conversions_value,
    }))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn rows(json: &str) -> Vec<GoogleAdsRow> {
        serde_json::from_str::<SearchResponse>(json).unwrap().results
    }

    #[test]
    fn test_metric_rows_convert_micros_and_string_ints() {
        let parsed = rows(
            r#"{"results":[{
                "campaign":{"resourceName":"customers/1/campaigns/42","id":"42"},
                "metrics":{"impressions":"1500","clicks":"75","conversions":3.0,
                           "costMicros":"12340000","conversionsValue":250.5},
                "segments":{"date":"2026-03-01"}
            }],"fieldMask":"campaign.id"}"#,
        );
        let record = metric_from_row(MetricLevel::Campaign, parsed.into_iter().next().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.external_id, "42");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(record.impressions, 1500);
        assert_eq!(record.clicks, 75);
        assert!((record.spend - 12.34).abs() < 1e-9);
        assert_eq!(record.revenue, 250.5);
    }

    #[test]
    fn test_missing_metrics_default_to_zero() {
        let parsed = rows(
            r#"{"results":[{"adGroup":{"id":"7"},"segments":{"date":"2026-03-02"}}]}"#,
        );
        let record = metric_from_row(MetricLevel::AdGroup, parsed.into_iter().next().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!((record.impressions, record.clicks, record.spend), (0, 0, 0.0));
    }

    #[test]
    fn test_metric_row_without_entity_is_dropped() {
        let parsed = rows(r#"{"results":[{"segments":{"date":"2026-03-02"}}]}"#);
        let record = metric_from_row(MetricLevel::Ad, parsed.into_iter().next().unwrap()).unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn test_ad_rows_carry_parent_ad_group() {
        let parsed = rows(
            r#"{"results":[{
                "adGroupAd":{"ad":{"id":"555","type":"RESPONSIVE_SEARCH_AD"},"status":"ENABLED"},
                "adGroup":{"id":"77"}
            }]}"#,
        );
        let ad = ad_from_row(parsed.into_iter().next().unwrap()).unwrap();
        assert_eq!(ad.external_id, "77~555");
        assert_eq!(ad.ad_group_external_id, "77");
        assert_eq!(ad.name, "Ad 555");
        assert_eq!(ad.ad_type.as_deref(), Some("RESPONSIVE_SEARCH_AD"));
    }

    #[test]
    fn test_shared_ad_id_is_keyed_per_ad_group() {
        let parsed = rows(
            r#"{"results":[
                {"adGroupAd":{"ad":{"id":"555"}},"adGroup":{"id":"77"}},
                {"adGroupAd":{"ad":{"id":"555"}},"adGroup":{"id":"78"}}
            ]}"#,
        );
        let ads: Vec<_> = parsed.into_iter().filter_map(ad_from_row).collect();
        assert_eq!(ads.len(), 2);
        assert_ne!(ads[0].external_id, ads[1].external_id);

        let metric_rows = rows(
            r#"{"results":[{
                "adGroupAd":{"ad":{"id":"555"}},"adGroup":{"id":"78"},
                "metrics":{"impressions":"10"},"segments":{"date":"2026-03-02"}
            }]}"#,
        );
        let record = metric_from_row(MetricLevel::Ad, metric_rows.into_iter().next().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.external_id, ads[1].external_id);
        assert_eq!(record.external_id, "78~555");
    }

    #[test]
    fn test_manager_accounts_are_skipped() {
        let parsed = rows(
            r#"{"results":[
                {"customer":{"id":"111","descriptiveName":"MCC","manager":true}},
                {"customer":{"id":"222","descriptiveName":"Shop","currencyCode":"EUR"}}
            ]}"#,
        );
        let accounts: Vec<_> = parsed.into_iter().filter_map(account_from_row).collect();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].external_id, "222");
        assert_eq!(accounts[0].currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_metrics_query_uses_level_resource_and_window() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        };
        let query = metrics_query(MetricLevel::Ad, range);
        assert!(query.starts_with("SELECT ad_group.id, ad_group_ad.ad.id, segments.date"));
        assert!(query.contains("FROM ad_group_ad WHERE segments.date BETWEEN '2026-02-01' AND '2026-02-28'"));
    }

    #[test]
    fn test_customer_resource_names() {
        assert_eq!(customer_id_from_resource("customers/1234567890"), Some("1234567890"));
        assert_eq!(customer_id_from_resource("customers/"), None);
        assert_eq!(customer_id_from_resource("campaigns/1"), None);
    }
}
