//! LinkedIn Marketing API (versioned Rest.li) client.
//!
//! LinkedIn's hierarchy is shifted one level against ours: campaign groups
//! are campaigns, campaigns are ad groups and creatives are ads.

use async_trait::async_trait;
use chrono::NaiveDate;
use db::models::{ad_account::AdPlatform, metrics::MetricLevel};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{
    AccountRef, AdPlatformClient, DateRange, MAX_PAGES, MetricRecord, PlatformError,
    RemoteAccount, RemoteAd, RemoteAdGroup, RemoteCampaign, de_f64_lenient, de_i64_lenient,
    de_id, http_client, map_reqwest_error, read_json,
};

const API_BASE: &str = "https://api.linkedin.com/rest";
pub const LINKEDIN_VERSION: &str = "202406";
const PAGE_SIZE: u32 = 100;

const ACCOUNT_URN: &str = "urn:li:sponsoredAccount:";

/// adAnalytics has no paging; it answers in one response of at most this
/// many elements and silently drops the rest.
const ANALYTICS_MAX_ELEMENTS: usize = 15_000;

#[derive(Debug, Clone)]
pub struct LinkedinAdsClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    elements: Vec<T>,
    metadata: Option<CollectionMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionMetadata {
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountUser {
    account: String,
}

#[derive(Debug, Deserialize)]
struct LinkedinAccount {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CampaignGroup {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkedinCampaign {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: Option<String>,
    status: Option<String>,
    campaign_group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Creative {
    id: String,
    campaign: Option<String>,
    name: Option<String>,
    intended_status: Option<String>,
    content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsElement {
    #[serde(default)]
    pivot_values: Vec<String>,
    date_range: AnalyticsDateRange,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    impressions: i64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    clicks: i64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    cost_in_local_currency: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    external_website_conversions: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    conversion_value_in_local_currency: f64,
}

#[derive(Debug, Deserialize)]
struct AnalyticsDateRange {
    start: DateParts,
}

#[derive(Debug, Deserialize)]
struct DateParts {
    year: i32,
    month: u32,
    day: u32,
}

impl LinkedinAdsClient {
    pub fn new() -> Result<Self, PlatformError> {
        Ok(Self {
            http: http_client()?,
        })
    }

    fn get(&self, url: &str, access_token: &str) -> RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, access_token: &str) -> Result<T, PlatformError> {
        let res = self
            .get(url, access_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(res).await
    }

    /// Fetch a finder collection, following `metadata.nextPageToken`
    async fn get_all<T: DeserializeOwned>(
        &self,
        access_token: &str,
        base_url: &str,
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let url = match &page_token {
                Some(token) => format!(
                    "{base_url}&pageSize={PAGE_SIZE}&pageToken={}",
                    urlencoding::encode(token)
                ),
                None => format!("{base_url}&pageSize={PAGE_SIZE}"),
            };
            let collection: Collection<T> = self.get_json(&url, access_token).await?;
            items.extend(collection.elements);

            match collection
                .metadata
                .and_then(|m| m.next_page_token)
                .filter(|t| !t.is_empty())
            {
                Some(next) => page_token = Some(next),
                None => {
                    debug!(pages = page + 1, items = items.len(), "LinkedIn collection complete");
                    return Ok(items);
                }
            }
        }

        warn!(base_url, "LinkedIn paging hit page limit");
        Ok(items)
    }
}

/// Trailing id of a URN such as `urn:li:sponsoredCampaign:123`
fn urn_id(urn: &str) -> &str {
    urn.rsplit(':').next().unwrap_or(urn)
}

fn rest_li_date(date: NaiveDate) -> String {
    use chrono::Datelike;
    format!(
        "(year:{},month:{},day:{})",
        date.year(),
        date.month(),
        date.day()
    )
}

fn analytics_url(account_id: &str, level: MetricLevel, range: DateRange) -> String {
    let pivot = match level {
        MetricLevel::Campaign => "CAMPAIGN_GROUP",
        MetricLevel::AdGroup => "CAMPAIGN",
        MetricLevel::Ad => "CREATIVE",
    };
    let account_urn = urlencoding::encode(&format!("{ACCOUNT_URN}{}", urn_id(account_id))).into_owned();
    format!(
        "{API_BASE}/adAnalytics?q=analytics&pivot={pivot}&timeGranularity=DAILY\
         &dateRange=(start:{},end:{})&accounts=List({account_urn})\
         &fields=pivotValues,dateRange,impressions,clicks,costInLocalCurrency,\
         externalWebsiteConversions,conversionValueInLocalCurrency",
        rest_li_date(range.from),
        rest_li_date(range.to),
    )
}

fn analytics_truncated(elements: usize) -> bool {
    elements >= ANALYTICS_MAX_ELEMENTS
}

fn metric_from_element(level: MetricLevel, element: AnalyticsElement) -> Option<MetricRecord> {
    let external_id = urn_id(element.pivot_values.first()?).to_string();
    let start = element.date_range.start;
    let date = NaiveDate::from_ymd_opt(start.year, start.month, start.day)?;
    Some(MetricRecord {
        level,
        external_id,
        date,
        impressions: element.impressions,
        clicks: element.clicks,
        conversions: element.external_website_conversions,
        spend: element.cost_in_local_currency,
        revenue: element.conversion_value_in_local_currency,
    })
}

fn creative_to_ad(creative: Creative) -> Option<RemoteAd> {
    let ad_group_external_id = urn_id(creative.campaign.as_deref()?).to_string();
    let external_id = urn_id(&creative.id).to_string();
    let ad_type = creative
        .content
        .as_ref()
        .and_then(|c| c.as_object())
        .and_then(|c| c.keys().next().cloned());
    Some(RemoteAd {
        name: creative
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Creative {external_id}")),
        external_id,
        ad_group_external_id,
        status: creative.intended_status.unwrap_or_else(|| "UNKNOWN".into()),
        ad_type,
    })
}

#[async_trait]
impl AdPlatformClient for LinkedinAdsClient {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Linkedin
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, PlatformError> {
        let users: Vec<AccountUser> = self
            .get_all(access_token, &format!("{API_BASE}/adAccountUsers?q=authenticatedUser"))
            .await?;

        let mut accounts = Vec::with_capacity(users.len());
        for user in users {
            let id = urn_id(&user.account).to_string();
            let url = format!("{API_BASE}/adAccounts/{id}");
            match self.get_json::<LinkedinAccount>(&url, access_token).await {
                Ok(account) => accounts.push(RemoteAccount {
                    name: account
                        .name
                        .unwrap_or_else(|| format!("LinkedIn ad account {}", account.id)),
                    external_id: account.id,
                    currency: account.currency,
                    login_customer_id: None,
                }),
                Err(e) => warn!(account_id = %id, error = %e, "Skipping unreadable LinkedIn ad account"),
            }
        }
        Ok(accounts)
    }

    async fn fetch_campaigns(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteCampaign>, PlatformError> {
        let url = format!(
            "{API_BASE}/adAccounts/{}/adCampaignGroups?q=search",
            urn_id(&account.external_id)
        );
        let groups: Vec<CampaignGroup> = self.get_all(access_token, &url).await?;
        Ok(groups
            .into_iter()
            .map(|g| RemoteCampaign {
                name: g.name.unwrap_or_else(|| g.id.clone()),
                external_id: g.id,
                status: g.status.unwrap_or_else(|| "UNKNOWN".into()),
                objective: None,
            })
            .collect())
    }

    async fn fetch_ad_groups(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAdGroup>, PlatformError> {
        let url = format!(
            "{API_BASE}/adAccounts/{}/adCampaigns?q=search",
            urn_id(&account.external_id)
        );
        let campaigns: Vec<LinkedinCampaign> = self.get_all(access_token, &url).await?;
        Ok(campaigns
            .into_iter()
            .filter_map(|c| {
                let campaign_external_id = urn_id(c.campaign_group.as_deref()?).to_string();
                Some(RemoteAdGroup {
                    name: c.name.unwrap_or_else(|| c.id.clone()),
                    external_id: c.id,
                    campaign_external_id,
                    status: c.status.unwrap_or_else(|| "UNKNOWN".into()),
                })
            })
            .collect())
    }

    async fn fetch_ads(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAd>, PlatformError> {
        let url = format!(
            "{API_BASE}/adAccounts/{}/creatives?q=criteria",
            urn_id(&account.external_id)
        );
        let creatives: Vec<Creative> = self.get_all(access_token, &url).await?;
        Ok(creatives.into_iter().filter_map(creative_to_ad).collect())
    }

    async fn fetch_metrics(
        &self,
        access_token: &str,
        account: &AccountRef,
        level: MetricLevel,
        range: DateRange,
    ) -> Result<Vec<MetricRecord>, PlatformError> {
        let url = analytics_url(&account.external_id, level, range);
        let collection: Collection<AnalyticsElement> = self.get_json(&url, access_token).await?;
        if analytics_truncated(collection.elements.len()) {
            warn!(
                account = %account.external_id,
                level = %level,
                elements = collection.elements.len(),
                "LinkedIn analytics response hit the element cap, metrics may be incomplete"
            );
        }
        Ok(collection
            .elements
            .into_iter()
            .filter_map(|e| metric_from_element(level, e))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_ids() {
        assert_eq!(urn_id("urn:li:sponsoredCampaign:123456"), "123456");
        assert_eq!(urn_id("508912345"), "508912345");
    }

    #[test]
    fn test_analytics_element_cap() {
        assert!(!analytics_truncated(0));
        assert!(!analytics_truncated(ANALYTICS_MAX_ELEMENTS - 1));
        assert!(analytics_truncated(ANALYTICS_MAX_ELEMENTS));
    }

    #[test]
    fn test_analytics_url_pivots_one_level_down() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
        };
        let url = analytics_url("508912345", MetricLevel::AdGroup, range);
        assert!(url.contains("pivot=CAMPAIGN&"));
        assert!(url.contains("dateRange=(start:(year:2026,month:1,day:5),end:(year:2026,month:2,day:3))"));
        assert!(url.contains("accounts=List(urn%3Ali%3AsponsoredAccount%3A508912345)"));
        assert!(analytics_url("1", MetricLevel::Campaign, range).contains("pivot=CAMPAIGN_GROUP&"));
        assert!(analytics_url("1", MetricLevel::Ad, range).contains("pivot=CREATIVE&"));
    }

    #[test]
    fn test_analytics_element_to_metric() {
        let collection: Collection<AnalyticsElement> = serde_json::from_str(
            r#"{"paging":{"start":0,"count":10,"links":[]},"elements":[{
                "pivotValues":["urn:li:sponsoredCampaign:777"],
                "dateRange":{"start":{"year":2026,"month":1,"day":7},"end":{"year":2026,"month":1,"day":7}},
                "impressions":4200,"clicks":61,
                "costInLocalCurrency":"88.912",
                "externalWebsiteConversions":3,
                "conversionValueInLocalCurrency":"450.0"
            }]}"#,
        )
        .unwrap();
        let record = metric_from_element(
            MetricLevel::AdGroup,
            collection.elements.into_iter().next().unwrap(),
        )
        .unwrap();
        assert_eq!(record.external_id, "777");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 1, 7).unwrap());
        assert_eq!((record.impressions, record.clicks), (4200, 61));
        assert!((record.spend - 88.912).abs() < 1e-9);
        assert_eq!(record.conversions, 3.0);
        assert_eq!(record.revenue, 450.0);
    }

    #[test]
    fn test_element_without_pivot_is_dropped() {
        let element: AnalyticsElement = serde_json::from_str(
            r#"{"pivotValues":[],"dateRange":{"start":{"year":2026,"month":1,"day":7}}}"#,
        )
        .unwrap();
        assert!(metric_from_element(MetricLevel::Ad, element).is_none());
    }

    #[test]
    fn test_creative_maps_to_ad() {
        let creative: Creative = serde_json::from_str(
            r#"{"id":"urn:li:sponsoredCreative:9001","campaign":"urn:li:sponsoredCampaign:777",
                "intendedStatus":"ACTIVE","content":{"reference":"urn:li:share:1"}}"#,
        )
        .unwrap();
        let ad = creative_to_ad(creative).unwrap();
        assert_eq!(ad.external_id, "9001");
        assert_eq!(ad.ad_group_external_id, "777");
        assert_eq!(ad.name, "Creative 9001");
        assert_eq!(ad.status, "ACTIVE");
        assert_eq!(ad.ad_type.as_deref(), Some("reference"));
    }

    #[test]
    fn test_collection_page_token() {
        let collection: Collection<CampaignGroup> = serde_json::from_str(
            r#"{"elements":[{"id":615,"name":"Brand","status":"ACTIVE"}],
                "metadata":{"nextPageToken":"DgGK"}}"#,
        )
        .unwrap();
        assert_eq!(collection.elements[0].id, "615");
        assert_eq!(
            collection.metadata.unwrap().next_page_token.as_deref(),
            Some("DgGK")
        );
    }
}
