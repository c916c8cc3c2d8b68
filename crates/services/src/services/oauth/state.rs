//! Signed `state` parameter carried through the provider consent screen.
//!
//! Format: `base64url(json payload) "." base64url(hmac-sha256(payload))`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use db::models::ad_account::AdPlatform;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::OAuthError;

type HmacSha256 = Hmac<Sha256>;

/// How long a consent round-trip may take
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub tenant_id: Uuid,
    pub profile_id: Uuid,
    pub platform: AdPlatform,
    pub nonce: String,
    /// Unix seconds
    pub issued_at: i64,
}

impl OAuthState {
    pub fn new(tenant_id: Uuid, profile_id: Uuid, platform: AdPlatform, now: DateTime<Utc>) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self {
            tenant_id,
            profile_id,
            platform,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            issued_at: now.timestamp(),
        }
    }

    pub fn sign(&self, secret: &[u8]) -> Result<String, OAuthError> {
        let payload = serde_json::to_vec(self).map_err(|e| OAuthError::InvalidState(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(mac(secret, payload.as_bytes())?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Check signature, age and that the callback is for the platform it was issued for
    pub fn verify(
        token: &str,
        secret: &[u8],
        expected_platform: AdPlatform,
        now: DateTime<Utc>,
    ) -> Result<Self, OAuthError> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| OAuthError::InvalidState("malformed".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| OAuthError::InvalidState("malformed signature".into()))?;

        mac(secret, payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| OAuthError::InvalidState("signature mismatch".into()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| OAuthError::InvalidState("malformed payload".into()))?;
        let state: OAuthState =
            serde_json::from_slice(&bytes).map_err(|e| OAuthError::InvalidState(e.to_string()))?;

        if state.platform != expected_platform {
            return Err(OAuthError::InvalidState(format!(
                "issued for {}, received on {}",
                state.platform, expected_platform
            )));
        }

        let issued_at = DateTime::<Utc>::from_timestamp(state.issued_at, 0)
            .ok_or_else(|| OAuthError::InvalidState("bad timestamp".into()))?;
        if now - issued_at > Duration::minutes(STATE_TTL_MINUTES) || issued_at > now + Duration::minutes(1)
        {
            return Err(OAuthError::InvalidState("expired".into()));
        }

        Ok(state)
    }
}

fn mac(secret: &[u8], data: &[u8]) -> Result<HmacSha256, OAuthError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| OAuthError::InvalidState("invalid signing secret".into()))?;
    mac.update(data);
    Ok(mac)
}
