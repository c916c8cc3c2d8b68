use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::{
    ad_account::{AdAccount, AdAccountSummary},
    sync_log::SyncLog,
};
use serde::Deserialize;
use services::services::sync::SyncReport;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

const DEFAULT_SYNC_LOG_LIMIT: i64 = 20;
const MAX_SYNC_LOG_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncLogQuery {
    pub limit: Option<i64>,
}

impl SyncLogQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_SYNC_LOG_LIMIT)
            .clamp(1, MAX_SYNC_LOG_LIMIT)
    }
}

pub async fn list_accounts(
    State(deployment): State<DeploymentImpl>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<AdAccountSummary>>>, ApiError> {
    let accounts = AdAccount::find_by_tenant(&deployment.db().pool, user.tenant_id).await?;
    Ok(ResponseJson(ApiResponse::success(
        accounts.into_iter().map(AdAccountSummary::from).collect(),
    )))
}

/// Disconnect an account; its campaigns and metrics go with it
pub async fn delete_account(
    State(deployment): State<DeploymentImpl>,
    Path(account_id): Path<Uuid>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows =
        AdAccount::delete_for_tenant(&deployment.db().pool, user.tenant_id, account_id).await?;
    if rows == 0 {
        return Err(ApiError::NotFound("ad account"));
    }
    info!(tenant_id = %user.tenant_id, ad_account_id = %account_id, "Ad account disconnected");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn sync_account(
    State(deployment): State<DeploymentImpl>,
    Path(account_id): Path<Uuid>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<SyncReport>>, ApiError> {
    let report = deployment
        .sync()
        .sync_account(user.tenant_id, account_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub async fn list_sync_logs(
    State(deployment): State<DeploymentImpl>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<SyncLogQuery>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<SyncLog>>>, ApiError> {
    let pool = &deployment.db().pool;
    AdAccount::find_for_tenant(pool, user.tenant_id, account_id)
        .await?
        .ok_or(ApiError::NotFound("ad account"))?;
    let logs = SyncLog::find_by_ad_account(pool, account_id, query.limit()).await?;
    Ok(ResponseJson(ApiResponse::success(logs)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/{account_id}", delete(delete_account))
        .route("/accounts/{account_id}/sync", post(sync_account))
        .route("/accounts/{account_id}/sync-logs", get(list_sync_logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_log_limit_is_clamped() {
        assert_eq!(SyncLogQuery::default().limit(), DEFAULT_SYNC_LOG_LIMIT);
        assert_eq!(SyncLogQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(SyncLogQuery { limit: Some(5000) }.limit(), MAX_SYNC_LOG_LIMIT);
    }
}
