use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::Utc;
use services::services::reports::{Report, ReportQuery};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

pub async fn get_report(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ReportQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Report>>, ApiError> {
    let report = deployment
        .reports()
        .generate(user.tenant_id, &query, Utc::now())
        .await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/reports", get(get_report))
}
