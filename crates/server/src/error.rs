use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    analytics::AnalyticsError,
    assistant::AssistantError,
    anthropic::AnthropicError,
    oauth::OAuthError,
    platforms::PlatformError,
    sync::SyncError,
    token_manager::TokenError,
};
use thiserror::Error;
use utils::{crypto::CryptoError, response::ApiResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn oauth_status(e: &OAuthError) -> StatusCode {
    match e {
        OAuthError::NotConfigured(_) | OAuthError::Denied(_) | OAuthError::InvalidState(_) => {
            StatusCode::BAD_REQUEST
        }
        OAuthError::RefreshTokenMissing | OAuthError::ReconnectRequired(_) => StatusCode::CONFLICT,
        OAuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        OAuthError::Provider { .. } | OAuthError::Transport(_) | OAuthError::Decode(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn platform_status(e: &PlatformError) -> StatusCode {
    match e {
        PlatformError::Unauthorized => StatusCode::CONFLICT,
        PlatformError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        PlatformError::Http { .. } | PlatformError::Transport(_) | PlatformError::Decode(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn token_status(e: &TokenError) -> StatusCode {
    match e {
        TokenError::OAuth(e) => oauth_status(e),
        TokenError::Platform(e) => platform_status(e),
        TokenError::Crypto(_) | TokenError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analytics_status(e: &AnalyticsError) -> StatusCode {
    match e {
        AnalyticsError::NotFound(_) => StatusCode::NOT_FOUND,
        AnalyticsError::InvalidRange { .. }
        | AnalyticsError::WindowTooLong { .. }
        | AnalyticsError::DateOutOfRange(_) => StatusCode::BAD_REQUEST,
        AnalyticsError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::OAuth(e) => oauth_status(e),
            ApiError::Platform(e) => platform_status(e),
            ApiError::Token(e) => token_status(e),
            ApiError::Sync(e) => match e {
                SyncError::AccountNotFound => StatusCode::NOT_FOUND,
                SyncError::Token(e) => token_status(e),
                SyncError::Platform(e) => platform_status(e),
                SyncError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Analytics(e) => analytics_status(e),
            ApiError::Assistant(e) => match e {
                AssistantError::NotConfigured | AssistantError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                AssistantError::Analytics(e) => analytics_status(e),
                AssistantError::Api(AnthropicError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
                AssistantError::Api(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Crypto(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };
        (status, ResponseJson(ApiResponse::<()>::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use db::models::ad_account::AdPlatform;

    use super::*;

    #[test]
    fn test_oauth_errors_map_to_client_or_gateway_status() {
        let status = |e: OAuthError| ApiError::from(e).status();
        assert_eq!(status(OAuthError::NotConfigured(AdPlatform::Meta)), StatusCode::BAD_REQUEST);
        assert_eq!(status(OAuthError::RefreshTokenMissing), StatusCode::CONFLICT);
        assert_eq!(status(OAuthError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status(OAuthError::Provider { status: 500, body: String::new() }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_nested_sync_errors_keep_their_meaning() {
        let expired = ApiError::from(SyncError::Token(TokenError::OAuth(
            OAuthError::ReconnectRequired("invalid_grant".into()),
        )));
        assert_eq!(expired.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(SyncError::AccountNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SyncError::Platform(PlatformError::RateLimited)).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_database_errors_are_not_leaked() {
        let response = ApiError::from(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_range_is_bad_request() {
        let from = chrono::NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let to = chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let err = ApiError::from(AnalyticsError::InvalidRange { from, to });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let too_long = AnalyticsError::WindowTooLong { days: 739_908, max: 366 };
        assert_eq!(
            ApiError::from(AssistantError::Analytics(too_long)).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
