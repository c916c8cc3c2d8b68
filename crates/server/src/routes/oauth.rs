//! Provider consent round-trip: authorize URL out, callback in.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Json as ResponseJson, Redirect},
    routing::get,
};
use chrono::Utc;
use db::models::ad_account::AdPlatform;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use services::services::oauth::{OAuthError, state::OAuthState};
use tracing::{info, warn};
use ts_rs::TS;
use url::Url;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

/// Frontend page the browser returns to after consent
const INTEGRATIONS_PATH: &str = "/settings/integrations";

#[derive(Debug, Clone, Serialize, TS)]
pub struct AuthorizeResponse {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn authorize(
    State(deployment): State<DeploymentImpl>,
    Path(platform): Path<AdPlatform>,
    user: AuthUser,
) -> Result<ResponseJson<ApiResponse<AuthorizeResponse>>, ApiError> {
    let provider = deployment.integrations().oauth(platform)?;
    let state = OAuthState::new(user.tenant_id, user.profile.id, platform, Utc::now())
        .sign(deployment.config().oauth_state_secret.expose_secret().as_bytes())?;
    let redirect_uri = deployment.config().oauth_redirect_uri(platform);

    Ok(ResponseJson(ApiResponse::success(AuthorizeResponse {
        url: provider.authorize_url(&state, &redirect_uri),
    })))
}

/// Always answers with a redirect to the frontend; the outcome travels in
/// the query string.
pub async fn callback(
    State(deployment): State<DeploymentImpl>,
    Path(platform): Path<AdPlatform>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let outcome = complete_connection(&deployment, platform, params).await;
    if let Err(e) = &outcome {
        warn!(platform = %platform, error = %e, "OAuth callback failed");
    }
    let target = callback_redirect(
        &deployment.config().frontend_url,
        platform,
        outcome.map_err(|e| e.to_string()),
    );
    Redirect::to(target.as_str())
}

async fn complete_connection(
    deployment: &DeploymentImpl,
    platform: AdPlatform,
    params: CallbackParams,
) -> Result<usize, ApiError> {
    if let Some(error) = params.error {
        let reason = params.error_description.unwrap_or(error);
        return Err(OAuthError::Denied(reason).into());
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".into()))?;
    let raw_state = params
        .state
        .ok_or_else(|| OAuthError::InvalidState("missing".into()))?;

    let config = deployment.config();
    let state = OAuthState::verify(
        &raw_state,
        config.oauth_state_secret.expose_secret().as_bytes(),
        platform,
        Utc::now(),
    )?;

    let accounts = deployment
        .tokens()
        .connect(&state, &code, &config.oauth_redirect_uri(platform))
        .await?;
    let connected = accounts.len();
    info!(
        tenant_id = %state.tenant_id,
        platform = %platform,
        accounts = connected,
        "OAuth connection completed, starting initial sync"
    );
    deployment.sync().spawn_initial_sync(accounts);
    Ok(connected)
}

fn callback_redirect(frontend: &Url, platform: AdPlatform, outcome: Result<usize, String>) -> Url {
    let mut url = frontend.clone();
    url.set_path(INTEGRATIONS_PATH);
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("platform", &platform.to_string());
        match outcome {
            Ok(accounts) => {
                query.append_pair("oauth", "success");
                query.append_pair("accounts", &accounts.to_string());
            }
            Err(message) => {
                query.append_pair("oauth", "error");
                query.append_pair("message", &message);
            }
        }
    }
    url
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/oauth/{platform}/authorize", get(authorize))
        .route("/oauth/{platform}/callback", get(callback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_redirect_carries_account_count() {
        let frontend = Url::parse("https://app.example.com/dashboard?x=1").unwrap();
        let url = callback_redirect(&frontend, AdPlatform::Google, Ok(3));
        assert_eq!(
            url.as_str(),
            "https://app.example.com/settings/integrations?platform=google&oauth=success&accounts=3"
        );
    }

    #[test]
    fn test_error_redirect_encodes_message() {
        let frontend = Url::parse("https://app.example.com").unwrap();
        let url = callback_redirect(
            &frontend,
            AdPlatform::Linkedin,
            Err("authorization denied: user cancelled".into()),
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("oauth".into(), "error".into())));
        assert!(pairs.contains(&("message".into(), "authorization denied: user cancelled".into())));
    }
}
