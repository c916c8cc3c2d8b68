//! Chat assistant answering questions about a tenant's ad performance.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    analytics::{
        AnalyticsError, AnalyticsService, CampaignBreakdown, DashboardQuery, DashboardSummary,
        Performance, by_campaign, previous_window, summarize,
    },
    anthropic::{AnthropicClient, AnthropicError, Message, Role},
};

const MAX_MESSAGES: usize = 20;
const MAX_MESSAGE_CHARS: usize = 4000;
const CONTEXT_CAMPAIGNS: usize = 10;
const MAX_REPLY_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = "You are a marketing analytics assistant. Answer questions about \
the advertiser's campaigns using only the performance data provided. Currency amounts are in \
the ad accounts' own currencies. If the data does not answer the question, say so.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant is not configured")]
    NotConfigured,
    #[error("invalid chat request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error("assistant request failed: {0}")]
    Api(#[from] AnthropicError),
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ChatReply {
    pub message: Message,
    /// Window the answer's data covers
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// The conversation must be non-empty, bounded, and end with a user turn
fn validate(messages: &[Message]) -> Result<(), AssistantError> {
    let Some(last) = messages.last() else {
        return Err(AssistantError::InvalidRequest("no messages".into()));
    };
    if last.role != Role::User {
        return Err(AssistantError::InvalidRequest(
            "last message must be from the user".into(),
        ));
    }
    if messages.len() > MAX_MESSAGES {
        return Err(AssistantError::InvalidRequest(format!(
            "at most {MAX_MESSAGES} messages per request"
        )));
    }
    if messages
        .iter()
        .any(|m| m.content.trim().is_empty() || m.content.chars().count() > MAX_MESSAGE_CHARS)
    {
        return Err(AssistantError::InvalidRequest(format!(
            "messages must be 1 to {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

fn write_performance(out: &mut String, p: &Performance) {
    let t = &p.totals;
    let _ = write!(
        out,
        "spend {:.2}, revenue {:.2}, ROAS {:.2}, impressions {}, clicks {}, CTR {:.2}%, CPC {:.2}, conversions {:.1}, CPA {:.2}",
        t.spend, t.revenue, p.roas, t.impressions, t.clicks, p.ctr, p.cpc, t.conversions, p.cpa
    );
}

fn format_change(change: Option<f64>) -> String {
    change.map_or_else(|| "n/a".to_string(), |c| format!("{c:+.1}%"))
}

/// Plain-text data block sent along with the conversation
pub fn build_context(summary: &DashboardSummary, campaigns: &[CampaignBreakdown]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Period: {} to {}", summary.from, summary.to);

    out.push_str("Total: ");
    write_performance(&mut out, &summary.performance);
    let _ = writeln!(
        out,
        "\nChange vs previous period: spend {}, revenue {}, ROAS {}, clicks {}, conversions {}",
        format_change(summary.change.spend),
        format_change(summary.change.revenue),
        format_change(summary.change.roas),
        format_change(summary.change.clicks),
        format_change(summary.change.conversions),
    );

    for platform in &summary.platforms {
        let _ = write!(out, "{}: ", platform.platform.display_name());
        write_performance(&mut out, &platform.performance);
        out.push('\n');
    }

    if !campaigns.is_empty() {
        let _ = writeln!(out, "Top campaigns by spend:");
        for campaign in campaigns.iter().take(CONTEXT_CAMPAIGNS) {
            let _ = write!(
                out,
                "- {} ({}, {}): ",
                campaign.campaign_name,
                campaign.platform.display_name(),
                campaign.campaign_status
            );
            write_performance(&mut out, &campaign.performance);
            out.push('\n');
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct AssistantService {
    client: Option<AnthropicClient>,
    analytics: AnalyticsService,
}

impl AssistantService {
    pub fn new(client: Option<AnthropicClient>, analytics: AnalyticsService) -> Self {
        Self { client, analytics }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn reply(
        &self,
        tenant_id: Uuid,
        request: &ChatRequest,
        today: NaiveDate,
    ) -> Result<ChatReply, AssistantError> {
        let client = self.client.as_ref().ok_or(AssistantError::NotConfigured)?;
        validate(&request.messages)?;

        let query = DashboardQuery {
            from: request.from,
            to: request.to,
            ..Default::default()
        };
        let range = query.range(today)?;
        let current = self.analytics.campaign_rows(tenant_id, &query, range).await?;
        let previous = self
            .analytics
            .campaign_rows(tenant_id, &query, previous_window(range)?)
            .await?;
        let summary = summarize(range, &current, &previous);
        let context = build_context(&summary, &by_campaign(&current));

        let system = format!("{SYSTEM_PROMPT}\n\n{context}");
        let text = client
            .complete(&request.messages, Some(&system), MAX_REPLY_TOKENS)
            .await?;

        info!(
            tenant_id = %tenant_id,
            turns = request.messages.len(),
            reply_chars = text.len(),
            "Assistant replied"
        );
        Ok(ChatReply {
            message: Message::assistant(text),
            from: range.from,
            to: range.to,
        })
    }
}

#[cfg(test)]
mod tests {
    use db::models::{ad_account::AdPlatform, metrics::CampaignMetricRow};

    use super::*;
    use crate::services::platforms::DateRange;

    #[test]
    fn test_validate_conversation() {
        assert!(validate(&[]).is_err());
        assert!(validate(&[Message::user("How is ROAS trending?")]).is_ok());
        assert!(validate(&[Message::user("hi"), Message::assistant("hello")]).is_err());
        assert!(validate(&[Message::user("   ")]).is_err());

        let long = vec![Message::user("q"); MAX_MESSAGES + 1];
        assert!(validate(&long).is_err());
    }

    #[test]
    fn test_context_lists_totals_and_campaigns() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let rows = vec![CampaignMetricRow {
            campaign_id: Uuid::new_v4(),
            campaign_name: "Summer Sale".into(),
            campaign_status: "ACTIVE".into(),
            ad_account_id: Uuid::nil(),
            account_name: "Shop".into(),
            platform: AdPlatform::Meta,
            date: day,
            impressions: 1000,
            clicks: 40,
            conversions: 4.0,
            spend: 80.0,
            revenue: 320.0,
        }];
        let summary = summarize(DateRange { from: day, to: day }, &rows, &[]);
        let context = build_context(&summary, &by_campaign(&rows));

        assert!(context.starts_with("Period: 2026-08-03 to 2026-08-03\n"));
        assert!(context.contains("Total: spend 80.00, revenue 320.00, ROAS 4.00"));
        assert!(context.contains("spend n/a"));
        assert!(context.contains("Meta Ads: spend 80.00"));
        assert!(context.contains("- Summer Sale (Meta Ads, ACTIVE): "));
    }

    #[tokio::test]
    async fn test_reply_without_client_is_not_configured() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = AssistantService::new(None, AnalyticsService::new(pool));
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            from: None,
            to: None,
        };
        let today = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert!(matches!(
            service.reply(Uuid::new_v4(), &request, today).await,
            Err(AssistantError::NotConfigured)
        ));
    }
}
