use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::Utc;
use services::services::analytics::{
    CampaignBreakdown, DailyPoint, DashboardQuery, DashboardSummary,
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

pub async fn get_summary(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DashboardQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<DashboardSummary>>, ApiError> {
    let summary = deployment
        .analytics()
        .summary(user.tenant_id, &query, Utc::now().date_naive())
        .await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub async fn get_campaigns(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DashboardQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<CampaignBreakdown>>>, ApiError> {
    let campaigns = deployment
        .analytics()
        .campaigns(user.tenant_id, &query, Utc::now().date_naive())
        .await?;
    Ok(ResponseJson(ApiResponse::success(campaigns)))
}

pub async fn get_timeseries(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DashboardQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<DailyPoint>>>, ApiError> {
    let points = deployment
        .analytics()
        .timeseries(user.tenant_id, &query, Utc::now().date_naive())
        .await?;
    Ok(ResponseJson(ApiResponse::success(points)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/summary", get(get_summary))
        .route("/campaigns", get(get_campaigns))
        .route("/timeseries", get(get_timeseries));

    Router::new().nest("/dashboard", inner)
}
