//! Drill-down from a campaign to its ad groups and from an ad group to its ads.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use services::services::analytics::{DashboardQuery, EntityPerformance};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    pub from: Option<chrono::NaiveDate>,
    pub to: Option<chrono::NaiveDate>,
}

impl WindowQuery {
    fn dashboard_query(&self) -> DashboardQuery {
        DashboardQuery {
            from: self.from,
            to: self.to,
            ..Default::default()
        }
    }
}

pub async fn get_ad_groups(
    State(deployment): State<DeploymentImpl>,
    Path(campaign_id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<EntityPerformance>>>, ApiError> {
    let range = window.dashboard_query().range(Utc::now().date_naive())?;
    let groups = deployment
        .analytics()
        .ad_groups_of_campaign(user.tenant_id, campaign_id, range)
        .await?;
    Ok(ResponseJson(ApiResponse::success(groups)))
}

pub async fn get_ads(
    State(deployment): State<DeploymentImpl>,
    Path(ad_group_id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<EntityPerformance>>>, ApiError> {
    let range = window.dashboard_query().range(Utc::now().date_naive())?;
    let ads = deployment
        .analytics()
        .ads_of_ad_group(user.tenant_id, ad_group_id, range)
        .await?;
    Ok(ResponseJson(ApiResponse::success(ads)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/campaigns/{campaign_id}/ad-groups", get(get_ad_groups))
        .route("/ad-groups/{ad_group_id}/ads", get(get_ads))
}
