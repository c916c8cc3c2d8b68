//! AES-256-GCM envelope used to store provider tokens at rest.
//!
//! Each secret is stored as three hex columns: ciphertext, a random 16-byte
//! IV and the 16-byte authentication tag.

use std::fmt;

use aes_gcm::{
    AeadInPlace, AesGcm, KeyInit,
    aead::{consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes encoded as 64 hex characters")]
    InvalidKey,
    #[error("invalid hex in {0}")]
    InvalidHex(&'static str),
    #[error("{field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: ciphertext or tag does not authenticate")]
    Decrypt,
    #[error("decrypted value is not valid utf-8")]
    Utf8,
}

/// One encrypted field as persisted (`<field>_encrypted`, `<field>_iv`, `<field>_auth_tag`)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    pub encrypted: String,
    pub iv: String,
    pub auth_tag: String,
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("encrypted", &format_args!("<{} hex chars>", self.encrypted.len()))
            .field("iv", &self.iv)
            .field("auth_tag", &self.auth_tag)
            .finish()
    }
}

impl EncryptedField {
    /// Assemble a field from three nullable columns; all must be present.
    pub fn from_columns(
        encrypted: Option<String>,
        iv: Option<String>,
        auth_tag: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            encrypted: encrypted?,
            iv: iv?,
            auth_tag: auth_tag?,
        })
    }
}

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm16,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCipher(..)")
    }
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let cipher = Aes256Gcm16::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Build a cipher from a 64 character hex key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, CryptoError> {
        let key = hex::decode(key_hex.trim()).map_err(|_| CryptoError::InvalidKey)?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, CryptoError> {
        let iv: [u8; IV_LEN] = rand::random();
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(EncryptedField {
            encrypted: hex::encode(&buffer),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        })
    }

    pub fn decrypt(&self, field: &EncryptedField) -> Result<String, CryptoError> {
        let mut buffer =
            hex::decode(&field.encrypted).map_err(|_| CryptoError::InvalidHex("ciphertext"))?;
        let iv = decode_fixed(&field.iv, "iv", IV_LEN)?;
        let tag = decode_fixed(&field.auth_tag, "auth tag", TAG_LEN)?;

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::Utf8)
    }
}

fn decode_fixed(value: &str, field: &'static str, expected: usize) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(value).map_err(|_| CryptoError::InvalidHex(field))?;
    if bytes.len() != expected {
        return Err(CryptoError::InvalidLength {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}
