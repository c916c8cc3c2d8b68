//! Keeps stored provider tokens usable: decrypts, refreshes ahead of expiry,
//! re-encrypts and persists, and records accounts that need a reconnect.

use chrono::{DateTime, Duration, Utc};
use db::models::ad_account::{AdAccount, AdAccountStatus, ConnectAdAccount};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use utils::crypto::CryptoError;

use super::{
    integrations::Integrations,
    oauth::{OAuthError, state::OAuthState},
    platforms::PlatformError,
    token_vault::{TokenSet, TokenVault},
};

/// Tokens this close to expiry are refreshed before use
pub const REFRESH_SKEW_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("token envelope: {0}")]
    Crypto(#[from] CryptoError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TokenError {
    pub fn requires_reconnect(&self) -> bool {
        match self {
            TokenError::OAuth(e) => e.requires_reconnect(),
            TokenError::Platform(PlatformError::Unauthorized) => true,
            _ => false,
        }
    }
}

/// Whether a token expiring at `expires_at` should be refreshed at `now`.
/// Tokens without a known expiry are used as-is.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now <= Duration::minutes(REFRESH_SKEW_MINUTES),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct TokenManager {
    pool: PgPool,
    vault: TokenVault,
    integrations: Integrations,
}

impl TokenManager {
    pub fn new(pool: PgPool, vault: TokenVault, integrations: Integrations) -> Self {
        Self {
            pool,
            vault,
            integrations,
        }
    }

    pub fn integrations(&self) -> &Integrations {
        &self.integrations
    }

    /// A usable access token for `account`, refreshed first when close to expiry
    pub async fn access_token(&self, account: &AdAccount) -> Result<SecretString, TokenError> {
        let tokens = self.vault.open(account)?;
        let now = Utc::now();
        if !needs_refresh(tokens.expires_at, now) {
            return Ok(tokens.access_token);
        }

        let provider = self.integrations.oauth(account.platform)?;
        match provider.refresh(&tokens).await {
            Ok(grant) => {
                let refreshed = grant.into_token_set(Some(&tokens), now);
                let columns = self.vault.seal(&refreshed)?;
                AdAccount::update_tokens(&self.pool, account.id, &columns).await?;
                info!(
                    ad_account_id = %account.id,
                    platform = %account.platform,
                    expires_at = ?refreshed.expires_at,
                    "Refreshed provider access token"
                );
                Ok(refreshed.access_token)
            }
            Err(e) if e.requires_reconnect() => {
                warn!(
                    ad_account_id = %account.id,
                    platform = %account.platform,
                    error = %e,
                    "Token refresh impossible, marking account expired"
                );
                AdAccount::mark_sync_failed(
                    &self.pool,
                    account.id,
                    AdAccountStatus::Expired,
                    &e.to_string(),
                )
                .await?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Finish a consent round-trip: exchange the code, discover the ad
    /// accounts the grant can reach and store each with sealed tokens.
    pub async fn connect(
        &self,
        state: &OAuthState,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Vec<AdAccount>, TokenError> {
        let integration = self.integrations.get(state.platform)?;
        let grant = integration.oauth.exchange_code(code, redirect_uri).await?;
        let tokens: TokenSet = grant.into_token_set(None, Utc::now());

        let remote_accounts = integration
            .client
            .list_accounts(tokens.access_token.expose_secret())
            .await?;
        let columns = self.vault.seal(&tokens)?;

        let mut connected = Vec::with_capacity(remote_accounts.len());
        for remote in remote_accounts {
            let account = AdAccount::upsert_connection(
                &self.pool,
                &ConnectAdAccount {
                    tenant_id: state.tenant_id,
                    connected_by: Some(state.profile_id),
                    platform: state.platform,
                    external_account_id: remote.external_id,
                    account_name: remote.name,
                    currency: remote.currency,
                    login_customer_id: remote.login_customer_id,
                    tokens: columns.clone(),
                },
            )
            .await?;
            connected.push(account);
        }

        info!(
            tenant_id = %state.tenant_id,
            platform = %state.platform,
            accounts = connected.len(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Connected ad accounts"
        );
        Ok(connected)
    }
}

#[cfg(test)]
mod tests {
    use db::models::ad_account::AdPlatform;

    use super::*;
    use crate::services::test_support::{
        FakeAdsClient, FakeOAuth, connected_account, tenant, token_manager, vault,
    };

    #[test]
    fn test_refresh_inside_skew_window() {
        let now = Utc::now();
        assert!(needs_refresh(Some(now + Duration::minutes(4)), now));
        assert!(needs_refresh(Some(now + Duration::minutes(5)), now));
        assert!(needs_refresh(Some(now - Duration::hours(1)), now));
    }

    #[test]
    fn test_no_refresh_when_fresh_or_unknown() {
        let now = Utc::now();
        assert!(!needs_refresh(Some(now + Duration::minutes(6)), now));
        assert!(!needs_refresh(Some(now + Duration::days(59)), now));
        assert!(!needs_refresh(None, now));
    }

    #[test]
    fn test_reconnect_classification() {
        assert!(TokenError::OAuth(OAuthError::RefreshTokenMissing).requires_reconnect());
        assert!(TokenError::Platform(PlatformError::Unauthorized).requires_reconnect());
        assert!(!TokenError::OAuth(OAuthError::RateLimited).requires_reconnect());
        assert!(!TokenError::Crypto(CryptoError::Decrypt).requires_reconnect());
    }

    fn oauth(refreshed_token: Option<&str>) -> FakeOAuth {
        FakeOAuth {
            platform: AdPlatform::Meta,
            refreshed_token: refreshed_token.map(str::to_string),
        }
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn test_expiring_token_is_refreshed_and_persisted(pool: PgPool) {
        let tenant = tenant(&pool).await;
        let account =
            connected_account(&pool, tenant.id, "act_1", Some(Utc::now() + Duration::minutes(1)))
                .await;
        let manager = token_manager(&pool, oauth(Some("fresh-access")), FakeAdsClient::default());

        let token = manager.access_token(&account).await.unwrap();
        assert_eq!(token.expose_secret(), "fresh-access");

        let stored = AdAccount::find_by_id(&pool, account.id).await.unwrap().unwrap();
        let opened = vault().open(&stored).unwrap();
        assert_eq!(opened.access_token.expose_secret(), "fresh-access");
        assert_eq!(opened.refresh_token.unwrap().expose_secret(), "stored-refresh");
        assert!(opened.expires_at.unwrap() > Utc::now() + Duration::minutes(50));

        // A fresh token is served from storage without another refresh
        let again = manager.access_token(&stored).await.unwrap();
        assert_eq!(again.expose_secret(), "fresh-access");
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn test_unrefreshable_token_marks_account_expired(pool: PgPool) {
        let tenant = tenant(&pool).await;
        let account =
            connected_account(&pool, tenant.id, "act_1", Some(Utc::now() - Duration::hours(1)))
                .await;
        let manager = token_manager(&pool, oauth(None), FakeAdsClient::default());

        let err = manager.access_token(&account).await.unwrap_err();
        assert!(err.requires_reconnect());

        let stored = AdAccount::find_by_id(&pool, account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AdAccountStatus::Expired);
        assert!(stored.last_sync_error.is_some());
        let opened = vault().open(&stored).unwrap();
        assert_eq!(opened.access_token.expose_secret(), "stored-access");
    }
}
