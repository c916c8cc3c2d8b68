use axum::{
    Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use chrono::Utc;
use services::services::assistant::{ChatReply, ChatRequest};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, auth::AuthUser, error::ApiError};

pub async fn chat(
    State(deployment): State<DeploymentImpl>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<ResponseJson<ApiResponse<ChatReply>>, ApiError> {
    let reply = deployment
        .assistant()
        .reply(user.tenant_id, &request, Utc::now().date_naive())
        .await?;
    Ok(ResponseJson(ApiResponse::success(reply)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/chat", post(chat))
}
