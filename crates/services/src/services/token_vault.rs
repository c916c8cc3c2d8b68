//! Seals and opens provider tokens for storage on `ad_accounts`.

use chrono::{DateTime, Utc};
use db::models::ad_account::{AdAccount, TokenColumns};
use secrecy::{ExposeSecret, SecretString};
use utils::crypto::{CryptoError, TokenCipher};

/// Decrypted provider credentials
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TokenVault {
    cipher: TokenCipher,
}

impl TokenVault {
    pub fn new(cipher: TokenCipher) -> Self {
        Self { cipher }
    }

    pub fn from_hex_key(key_hex: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(TokenCipher::from_hex_key(key_hex)?))
    }

    pub fn seal(&self, tokens: &TokenSet) -> Result<TokenColumns, CryptoError> {
        let access_token = self.cipher.encrypt(tokens.access_token.expose_secret())?;
        let refresh_token = tokens
            .refresh_token
            .as_ref()
            .map(|t| self.cipher.encrypt(t.expose_secret()))
            .transpose()?;

        Ok(TokenColumns {
            access_token,
            refresh_token,
            expires_at: tokens.expires_at,
        })
    }

    pub fn open(&self, account: &AdAccount) -> Result<TokenSet, CryptoError> {
        let access_token = self.cipher.decrypt(&account.access_token_field())?;
        let refresh_token = account
            .refresh_token_field()
            .map(|field| self.cipher.decrypt(&field))
            .transpose()?;

        Ok(TokenSet {
            access_token: access_token.into(),
            refresh_token: refresh_token.map(Into::into),
            expires_at: account.token_expires_at,
        })
    }
}
