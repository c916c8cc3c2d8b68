use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{ad_account::AdPlatform, profile::Profile, tenant::Tenant};
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

#[derive(Debug, Clone, Serialize, TS)]
pub struct PlatformAvailability {
    pub platform: AdPlatform,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct MeResponse {
    pub profile: Profile,
    pub tenant: Tenant,
    pub platforms: Vec<PlatformAvailability>,
    pub assistant_enabled: bool,
}

pub async fn get_me(
    State(deployment): State<DeploymentImpl>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<MeResponse>>, ApiError> {
    let tenant = Tenant::find_by_id(&deployment.db().pool, user.tenant_id)
        .await?
        .ok_or(ApiError::NotFound("tenant"))?;

    let integrations = deployment.integrations();
    let platforms = AdPlatform::ALL
        .iter()
        .map(|p| PlatformAvailability {
            platform: *p,
            name: p.display_name().to_string(),
            enabled: integrations.is_enabled(*p),
        })
        .collect();

    Ok(ResponseJson(ApiResponse::success(MeResponse {
        profile: user.profile,
        tenant,
        platforms,
        assistant_enabled: deployment.assistant().is_enabled(),
    })))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/me", get(get_me))
}
