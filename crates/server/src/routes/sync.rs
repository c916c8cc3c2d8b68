use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use services::services::sync::SyncOutcome;
use tracing::info;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

/// Sync every active account of the caller's tenant, one at a time
pub async fn sync_tenant(
    State(deployment): State<DeploymentImpl>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<SyncOutcome>>>, ApiError> {
    let outcomes = deployment.sync().sync_tenant(user.tenant_id).await?;
    let failed = outcomes.iter().filter(|o| !o.success).count();
    info!(
        tenant_id = %user.tenant_id,
        accounts = outcomes.len(),
        failed,
        "Tenant sync finished"
    );
    Ok(ResponseJson(ApiResponse::success(outcomes)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/sync", post(sync_tenant))
}
