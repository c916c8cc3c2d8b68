//! Supabase JWT verification and the authenticated-user extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use db::models::profile::Profile;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

/// Audience Supabase puts on tokens of signed-in users
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub aud: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))
}

/// The signed-in user and the tenant every query is scoped to
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub profile: Profile,
    pub tenant_id: Uuid,
}

impl FromRequestParts<DeploymentImpl> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let claims = verify_token(
            bearer.token(),
            deployment.config().jwt_secret.expose_secret().as_bytes(),
        )?;

        let profile = Profile::find_by_id(&deployment.db().pool, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("no profile for user".into()))?;

        Ok(Self {
            tenant_id: profile.tenant_id,
            profile,
        })
    }
}
