use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, warn};

use crate::DeploymentImpl;

pub mod accounts;
pub mod campaigns;
pub mod chat;
pub mod dashboard;
pub mod health;
pub mod me;
pub mod oauth;
pub mod reports;
pub mod sync;

fn cors_layer(deployment: &DeploymentImpl) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let origin = deployment.config().frontend_url.origin().ascii_serialization();
    match HeaderValue::from_str(&origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!(origin = %origin, error = %e, "Frontend origin is not a valid header, CORS disabled");
            cors
        }
    }
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(health::router(&deployment))
        .merge(me::router(&deployment))
        .merge(oauth::router(&deployment))
        .merge(accounts::router(&deployment))
        .merge(sync::router(&deployment))
        .merge(dashboard::router(&deployment))
        .merge(campaigns::router(&deployment))
        .merge(reports::router(&deployment))
        .merge(chat::router(&deployment));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&deployment))
        .with_state(deployment)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use db::DBService;
    use services::services::config::Config;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;

    /// Router over a pool that never connects; only routes that stop
    /// before touching the database are exercised.
    fn test_app() -> Router {
        let env = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/unused"),
            ("PUBLIC_BASE_URL", "https://api.example.com"),
            ("FRONTEND_URL", "https://app.example.com"),
            (
                "TOKEN_ENCRYPTION_KEY",
                "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
            ),
            ("SUPABASE_JWT_SECRET", "test-secret"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let deployment = DeploymentImpl::with_db(config, DBService::from_pool(pool)).unwrap();
        router(deployment)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = test_app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_a_token() {
        for uri in ["/api/me", "/api/accounts", "/api/dashboard/summary", "/api/reports"] {
            let response = test_app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }

        let response = test_app()
            .oneshot(
                Request::get("/api/me")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_callback_without_code_redirects_with_error() {
        let response = test_app()
            .oneshot(
                Request::get("/api/oauth/meta/callback?state=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://app.example.com/settings/integrations?"));
        assert!(location.contains("oauth=error"));
        assert!(location.contains("platform=meta"));
    }

    #[tokio::test]
    async fn test_unknown_platform_is_rejected() {
        let response = test_app()
            .oneshot(
                Request::get("/api/oauth/tiktok/callback")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
