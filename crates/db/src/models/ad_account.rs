use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::crypto::EncryptedField;
use uuid::Uuid;

/// Advertising platform an account belongs to
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "ad_platform", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdPlatform {
    Google,
    Meta,
    Linkedin,
}

impl AdPlatform {
    pub const ALL: [AdPlatform; 3] = [AdPlatform::Google, AdPlatform::Meta, AdPlatform::Linkedin];

    pub fn display_name(&self) -> &'static str {
        match self {
            AdPlatform::Google => "Google Ads",
            AdPlatform::Meta => "Meta Ads",
            AdPlatform::Linkedin => "LinkedIn Ads",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "ad_account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdAccountStatus {
    #[default]
    Active,
    /// Token can no longer be refreshed; the user must reconnect
    Expired,
    Error,
    Disconnected,
}

/// Connected ad account with its encrypted token columns
#[derive(Clone, FromRow)]
pub struct AdAccount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub connected_by: Option<Uuid>,
    pub platform: AdPlatform,
    pub external_account_id: String,
    pub account_name: String,
    pub currency: Option<String>,
    pub login_customer_id: Option<String>,
    pub access_token_encrypted: String,
    pub access_token_iv: String,
    pub access_token_auth_tag: String,
    pub refresh_token_encrypted: Option<String>,
    pub refresh_token_iv: Option<String>,
    pub refresh_token_auth_tag: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub status: AdAccountStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for AdAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdAccount")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("platform", &self.platform)
            .field("external_account_id", &self.external_account_id)
            .field("status", &self.status)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}

impl AdAccount {
    pub fn access_token_field(&self) -> EncryptedField {
        EncryptedField {
            encrypted: self.access_token_encrypted.clone(),
            iv: self.access_token_iv.clone(),
            auth_tag: self.access_token_auth_tag.clone(),
        }
    }

    pub fn refresh_token_field(&self) -> Option<EncryptedField> {
        EncryptedField::from_columns(
            self.refresh_token_encrypted.clone(),
            self.refresh_token_iv.clone(),
            self.refresh_token_auth_tag.clone(),
        )
    }
}

/// Account as exposed over the API; carries no token material
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AdAccountSummary {
    pub id: Uuid,
    pub platform: AdPlatform,
    pub external_account_id: String,
    pub account_name: String,
    pub currency: Option<String>,
    pub status: AdAccountStatus,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AdAccount> for AdAccountSummary {
    fn from(account: AdAccount) -> Self {
        Self {
            id: account.id,
            platform: account.platform,
            external_account_id: account.external_account_id,
            account_name: account.account_name,
            currency: account.currency,
            status: account.status,
            token_expires_at: account.token_expires_at,
            last_synced_at: account.last_synced_at,
            last_sync_error: account.last_sync_error,
            created_at: account.created_at,
        }
    }
}

/// Encrypted token columns written together
#[derive(Debug, Clone)]
pub struct TokenColumns {
    pub access_token: EncryptedField,
    pub refresh_token: Option<EncryptedField>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Data for connecting (or reconnecting) an account after OAuth
#[derive(Debug, Clone)]
pub struct ConnectAdAccount {
    pub tenant_id: Uuid,
    pub connected_by: Option<Uuid>,
    pub platform: AdPlatform,
    pub external_account_id: String,
    pub account_name: String,
    pub currency: Option<String>,
    pub login_customer_id: Option<String>,
    pub tokens: TokenColumns,
}

const AD_ACCOUNT_COLUMNS: &str = r#"
    id, tenant_id, connected_by, platform, external_account_id, account_name, currency,
    login_customer_id, access_token_encrypted, access_token_iv, access_token_auth_tag,
    refresh_token_encrypted, refresh_token_iv, refresh_token_auth_tag, token_expires_at,
    status, last_synced_at, last_sync_error, created_at, updated_at"#;

impl AdAccount {
    /// Insert a connection, or refresh name and tokens of an existing one.
    /// A reconnect that yields no refresh token keeps the stored one.
    pub async fn upsert_connection(
        pool: &PgPool,
        data: &ConnectAdAccount,
    ) -> Result<Self, sqlx::Error> {
        let refresh = data.tokens.refresh_token.as_ref();
        let sql = format!(
            r#"INSERT INTO ad_accounts (
                tenant_id, connected_by, platform, external_account_id, account_name, currency,
                login_customer_id, access_token_encrypted, access_token_iv, access_token_auth_tag,
                refresh_token_encrypted, refresh_token_iv, refresh_token_auth_tag, token_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tenant_id, platform, external_account_id) DO UPDATE SET
                connected_by = excluded.connected_by,
                account_name = excluded.account_name,
                currency = excluded.currency,
                login_customer_id = excluded.login_customer_id,
                access_token_encrypted = excluded.access_token_encrypted,
                access_token_iv = excluded.access_token_iv,
                access_token_auth_tag = excluded.access_token_auth_tag,
                refresh_token_encrypted = COALESCE(excluded.refresh_token_encrypted, ad_accounts.refresh_token_encrypted),
                refresh_token_iv = COALESCE(excluded.refresh_token_iv, ad_accounts.refresh_token_iv),
                refresh_token_auth_tag = COALESCE(excluded.refresh_token_auth_tag, ad_accounts.refresh_token_auth_tag),
                token_expires_at = excluded.token_expires_at,
                status = 'active',
                last_sync_error = NULL,
                updated_at = now()
            RETURNING {AD_ACCOUNT_COLUMNS}"#
        );

        sqlx::query_as::<_, AdAccount>(&sql)
            .bind(data.tenant_id)
            .bind(data.connected_by)
            .bind(data.platform)
            .bind(&data.external_account_id)
            .bind(&data.account_name)
            .bind(&data.currency)
            .bind(&data.login_customer_id)
            .bind(&data.tokens.access_token.encrypted)
            .bind(&data.tokens.access_token.iv)
            .bind(&data.tokens.access_token.auth_tag)
            .bind(refresh.map(|f| f.encrypted.as_str()))
            .bind(refresh.map(|f| f.iv.as_str()))
            .bind(refresh.map(|f| f.auth_tag.as_str()))
            .bind(data.tokens.expires_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {AD_ACCOUNT_COLUMNS} FROM ad_accounts WHERE id = $1");
        sqlx::query_as::<_, AdAccount>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Tenant-scoped lookup; accounts of other tenants are invisible
    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {AD_ACCOUNT_COLUMNS} FROM ad_accounts WHERE id = $1 AND tenant_id = $2"
        );
        sqlx::query_as::<_, AdAccount>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"SELECT {AD_ACCOUNT_COLUMNS}
               FROM ad_accounts
               WHERE tenant_id = $1
               ORDER BY platform, account_name"#
        );
        sqlx::query_as::<_, AdAccount>(&sql)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Accounts eligible for sync within a tenant (active, or failed last time)
    pub async fn find_syncable_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"SELECT {AD_ACCOUNT_COLUMNS}
               FROM ad_accounts
               WHERE tenant_id = $1 AND status IN ('active', 'error')
               ORDER BY created_at"#
        );
        sqlx::query_as::<_, AdAccount>(&sql)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_all_syncable(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"SELECT {AD_ACCOUNT_COLUMNS}
               FROM ad_accounts
               WHERE status IN ('active', 'error')
               ORDER BY tenant_id, created_at"#
        );
        sqlx::query_as::<_, AdAccount>(&sql).fetch_all(pool).await
    }

    pub async fn update_tokens(
        pool: &PgPool,
        id: Uuid,
        tokens: &TokenColumns,
    ) -> Result<(), sqlx::Error> {
        let refresh = tokens.refresh_token.as_ref();
        sqlx::query(
            r#"UPDATE ad_accounts
               SET access_token_encrypted = $2,
                   access_token_iv = $3,
                   access_token_auth_tag = $4,
                   refresh_token_encrypted = COALESCE($5, refresh_token_encrypted),
                   refresh_token_iv = COALESCE($6, refresh_token_iv),
                   refresh_token_auth_tag = COALESCE($7, refresh_token_auth_tag),
                   token_expires_at = $8,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&tokens.access_token.encrypted)
        .bind(&tokens.access_token.iv)
        .bind(&tokens.access_token.auth_tag)
        .bind(refresh.map(|f| f.encrypted.as_str()))
        .bind(refresh.map(|f| f.iv.as_str()))
        .bind(refresh.map(|f| f.auth_tag.as_str()))
        .bind(tokens.expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_synced(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE ad_accounts
               SET status = 'active',
                   last_synced_at = now(),
                   last_sync_error = NULL,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_sync_failed(
        pool: &PgPool,
        id: Uuid,
        status: AdAccountStatus,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE ad_accounts
               SET status = $2,
                   last_sync_error = $3,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ad_accounts WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_platform_string_forms() {
        assert_eq!(AdPlatform::from_str("linkedin").unwrap(), AdPlatform::Linkedin);
        assert_eq!(AdPlatform::Google.to_string(), "google");
        assert_eq!(serde_json::to_string(&AdPlatform::Meta).unwrap(), "\"meta\"");
        assert!(AdPlatform::from_str("tiktok").is_err());
    }

    #[test]
    fn test_debug_output_hides_tokens() {
        let now = Utc::now();
        let account = AdAccount {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            connected_by: None,
            platform: AdPlatform::Google,
            external_account_id: "1234567890".into(),
            account_name: "Acme".into(),
            currency: Some("USD".into()),
            login_customer_id: None,
            access_token_encrypted: "deadbeef".into(),
            access_token_iv: "00".repeat(16),
            access_token_auth_tag: "11".repeat(16),
            refresh_token_encrypted: None,
            refresh_token_iv: None,
            refresh_token_auth_tag: None,
            token_expires_at: None,
            status: AdAccountStatus::Active,
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        };
        let debug = format!("{:?}", account);
        assert!(!debug.contains("deadbeef"));
        assert!(account.refresh_token_field().is_none());
        assert_eq!(account.access_token_field().encrypted, "deadbeef");

        let summary = AdAccountSummary::from(account);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("deadbeef"));
    }
}
