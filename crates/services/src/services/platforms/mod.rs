//! Clients for the ad platforms' reporting APIs, normalized to one shape.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use db::models::{ad_account::AdPlatform, metrics::MetricLevel};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use thiserror::Error;

pub mod google_ads;
pub mod linkedin_ads;
pub mod meta_ads;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("access token rejected by provider")]
    Unauthorized,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Inclusive date window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// The `days` days ending on `today`, inclusive
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        Self {
            from: today - chrono::Duration::days(days.max(1) - 1),
            to: today,
        }
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

/// Account discovered through the provider after consent
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAccount {
    pub external_id: String,
    pub name: String,
    pub currency: Option<String>,
    /// Google: manager account the customer is reached through
    pub login_customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCampaign {
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub objective: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAdGroup {
    pub external_id: String,
    pub campaign_external_id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAd {
    pub external_id: String,
    pub ad_group_external_id: String,
    pub name: String,
    pub status: String,
    pub ad_type: Option<String>,
}

/// One day of performance for one provider entity
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub level: MetricLevel,
    pub external_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
    pub spend: f64,
    pub revenue: f64,
}

/// Identifies the provider-side account a sync is for
#[derive(Debug, Clone)]
pub struct AccountRef {
    pub external_id: String,
    pub login_customer_id: Option<String>,
}

#[async_trait]
pub trait AdPlatformClient: Send + Sync {
    fn platform(&self) -> AdPlatform;

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, PlatformError>;

    async fn fetch_campaigns(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteCampaign>, PlatformError>;

    async fn fetch_ad_groups(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAdGroup>, PlatformError>;

    async fn fetch_ads(
        &self,
        access_token: &str,
        account: &AccountRef,
    ) -> Result<Vec<RemoteAd>, PlatformError>;

    async fn fetch_metrics(
        &self,
        access_token: &str,
        account: &AccountRef,
        level: MetricLevel,
        range: DateRange,
    ) -> Result<Vec<MetricRecord>, PlatformError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Guard against providers that keep returning a next page
pub(crate) const MAX_PAGES: usize = 500;

pub(crate) fn http_client() -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("adsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Transport(e.to_string()))
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Transport("request timed out".to_string())
    } else {
        PlatformError::Transport(e.to_string())
    }
}

/// Decode a successful body or translate the failure status
pub(crate) async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, PlatformError> {
    let status = res.status();
    let body = res.text().await.map_err(map_reqwest_error)?;
    if !status.is_success() {
        return Err(classify_status(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            json_error = %e,
            body_preview = %body.chars().take(300).collect::<String>(),
            "Failed to decode platform response"
        );
        PlatformError::Decode(e.to_string())
    })
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> PlatformError {
    match status {
        StatusCode::UNAUTHORIZED => PlatformError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited,
        s => PlatformError::Http {
            status: s.as_u16(),
            body: body.chars().take(500).collect(),
        },
    }
}

/// Numbers that providers send either as JSON numbers or as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

pub(crate) fn de_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Int(i)) => i,
        Some(NumberOrString::Float(f)) => f.round() as i64,
        Some(NumberOrString::Str(s)) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(0),
        None => 0,
    })
}

pub(crate) fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Int(i)) => i as f64,
        Some(NumberOrString::Float(f)) => f,
        Some(NumberOrString::Str(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        None => 0.0,
    })
}

/// Identifiers that arrive as JSON strings or numbers
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(i) => i.to_string(),
        NumberOrString::Float(f) => format!("{f:.0}"),
        NumberOrString::Str(s) => s,
    })
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, PlatformError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| PlatformError::Decode(format!("invalid date {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "de_i64_lenient")]
        count: i64,
        #[serde(default, deserialize_with = "de_f64_lenient")]
        amount: f64,
    }

    #[derive(Deserialize)]
    struct WithId {
        #[serde(deserialize_with = "de_id")]
        id: String,
    }

    #[test]
    fn test_lenient_numbers() {
        let v: Lenient = serde_json::from_str(r#"{"count":"1200","amount":"12.50"}"#).unwrap();
        assert_eq!((v.count, v.amount), (1200, 12.5));
        let v: Lenient = serde_json::from_str(r#"{"count":7,"amount":3}"#).unwrap();
        assert_eq!((v.count, v.amount), (7, 3.0));
        let v: Lenient = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!((v.count, v.amount), (0, 0.0));
        let v: Lenient = serde_json::from_str(r#"{"count":null,"amount":"n/a"}"#).unwrap();
        assert_eq!((v.count, v.amount), (0, 0.0));
    }

    #[test]
    fn test_ids_from_numbers_or_strings() {
        let a: WithId = serde_json::from_str(r#"{"id":"23851234"}"#).unwrap();
        let b: WithId = serde_json::from_str(r#"{"id":507404993}"#).unwrap();
        assert_eq!(a.id, "23851234");
        assert_eq!(b.id, "507404993");
    }

    #[test]
    fn test_trailing_range_is_inclusive() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let range = DateRange::trailing(today, 30);
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(range.days(), 30);
        assert_eq!(DateRange::trailing(today, 0).days(), 1);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, ""), PlatformError::Unauthorized);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "").to_string(),
            "rate limit exceeded"
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "x"),
            PlatformError::Http { status: 502, .. }
        ));
    }
}
