//! Signing key decryption
//!
//! Route keys are stored as `ivHex:cipherHex`, AES-256-CTR encrypted under
//! SHA-256 of the relayer passphrase. The passphrase comes from
//! `LP_RELAYER_PASSWORD`; without it the process cannot sign and must not
//! start.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use alloy::signers::local::PrivateKeySigner;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub const PASSWORD_ENV: &str = "LP_RELAYER_PASSWORD";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("LP_RELAYER_PASSWORD is not set")]
    MissingPassword,

    #[error("encrypted key must be ivHex:cipherHex")]
    Malformed,

    #[error("invalid hex in encrypted key: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("iv must be 16 bytes, got {0}")]
    IvLength(usize),

    #[error("decrypted key is not a valid private key (wrong passphrase?)")]
    InvalidKey,
}

/// Holds the derived AES key for the process lifetime
#[derive(Clone)]
pub struct KeyDecryptor {
    key: [u8; 32],
}

impl fmt::Debug for KeyDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDecryptor")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl KeyDecryptor {
    pub fn from_password(password: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        Self { key }
    }

    /// Read the passphrase from the environment
    pub fn from_env() -> Result<Self, SecretError> {
        std::env::var(PASSWORD_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| Self::from_password(&p))
            .ok_or(SecretError::MissingPassword)
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<Vec<u8>, SecretError> {
        let (iv_hex, cipher_hex) = encrypted.split_once(':').ok_or(SecretError::Malformed)?;
        let iv = hex::decode(iv_hex)?;
        let iv: [u8; 16] = iv
            .as_slice()
            .try_into()
            .map_err(|_| SecretError::IvLength(iv.len()))?;
        let mut buffer = hex::decode(cipher_hex)?;

        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut buffer);
        Ok(buffer)
    }

    pub fn encrypt(&self, plaintext: &[u8], iv: [u8; 16]) -> String {
        let mut buffer = plaintext.to_vec();
        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut buffer);
        format!("{}:{}", hex::encode(iv), hex::encode(buffer))
    }

    /// Decrypt a route's signing key
    pub fn signer(&self, encrypted: &str) -> Result<PrivateKeySigner, SecretError> {
        let plain = self.decrypt(encrypted)?;
        let text = std::str::from_utf8(&plain).map_err(|_| SecretError::InvalidKey)?;
        text.trim().parse().map_err(|_| SecretError::InvalidKey)
    }
}
