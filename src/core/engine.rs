//! Encryption engine.
//!
//! Stateless operations over the primitives in [`crate::core::cipher`]. The
//! only thing an engine holds is an optional [`KeySource`] used to resolve
//! managed key ids.
//!
//! Every output is self-describing: payloads carry their format version,
//! algorithm, KDF parameters and nonce, so decryption never depends on
//! out-of-band knowledge.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::cipher::{self, aead, kdf, mac, SymmetricKey};
use crate::core::constants::{
    NONCE_SIZE, PASSWORD_SALT_SIZE, PAYLOAD_VERSION, PBKDF2_ITERATIONS, PBKDF2_MAX_ITERATIONS,
};
use crate::core::types::HexString;
use crate::error::{CipherError, KeyError, Result};

/// AEAD algorithm identifier written into payloads.
pub const ALGORITHM: &str = "AES-256-GCM";

/// KDF identifier written into password payloads.
pub const KDF: &str = "PBKDF2-HMAC-SHA256";

/// Resolves managed key ids to key material.
///
/// Implemented by [`crate::core::keys::KeyManager`].
pub trait KeySource {
    /// Active symmetric key for `key_id`, used for new ciphertexts.
    fn encryption_key(&self, key_id: &str) -> Result<Option<SymmetricKey>>;

    /// Symmetric key for `key_id` in any non-destroyed generation.
    fn decryption_key(&self, key_id: &str) -> Result<Option<SymmetricKey>>;

    /// Key used for HMAC operations.
    fn hmac_key(&self, key_id: &str) -> Result<Option<SymmetricKey>> {
        self.encryption_key(key_id)
    }
}

/// Output of [`EncryptionEngine::encrypt_with_password`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPayload {
    pub version: String,
    pub algorithm: String,
    pub kdf: String,
    pub iterations: u32,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
    #[serde(with = "hex")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_data: Option<HexString>,
}

/// Output of [`EncryptionEngine::encrypt_with_managed_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedPayload {
    pub version: String,
    pub algorithm: String,
    pub key_id: String,
    #[serde(with = "hex")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_data: Option<HexString>,
}

/// Symmetric, asymmetric and MAC operations.
#[derive(Clone, Default)]
pub struct EncryptionEngine {
    keys: Option<Arc<dyn KeySource + Send + Sync>>,
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("key_source", &self.keys.is_some())
            .finish()
    }
}

impl EncryptionEngine {
    /// Engine without a key source; only password and RSA operations work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine resolving managed key ids through `source`.
    pub fn with_key_source(source: Arc<dyn KeySource + Send + Sync>) -> Self {
        Self { keys: Some(source) }
    }

    fn source(&self) -> Result<&(dyn KeySource + Send + Sync)> {
        self.keys.as_deref().ok_or_else(|| {
            CipherError::InvalidInput("no key source configured for managed keys".to_string())
                .into()
        })
    }

    // --- Password encryption ---

    /// Encrypt `plaintext` under a key derived from `password`.
    ///
    /// Empty plaintext is valid.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::EmptyPassword` if `password` is empty.
    pub fn encrypt_with_password(
        &self,
        plaintext: &[u8],
        password: &str,
        associated_data: Option<&[u8]>,
    ) -> Result<PasswordPayload> {
        let salt = cipher::random_bytes::<PASSWORD_SALT_SIZE>()?;
        let key = kdf::derive_from_password(password.as_bytes(), &salt, PBKDF2_ITERATIONS)?;
        let aad = associated_data.unwrap_or_default();
        let (ciphertext, nonce) = aead::seal(&key, aad, plaintext)?;

        Ok(PasswordPayload {
            version: PAYLOAD_VERSION.to_string(),
            algorithm: ALGORITHM.to_string(),
            kdf: KDF.to_string(),
            iterations: PBKDF2_ITERATIONS,
            salt: salt.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
            associated_data: associated_data.map(hex::encode),
        })
    }

    /// Decrypt a [`PasswordPayload`].
    ///
    /// # Errors
    ///
    /// Returns `CipherError::DecryptionFailed` for a wrong password or
    /// tampered payload, without saying which. An iteration count outside
    /// the accepted range is `CipherError::UnsupportedFormat`.
    pub fn decrypt_with_password(
        &self,
        payload: &PasswordPayload,
        password: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        check_format(&payload.version, &payload.algorithm)?;
        if payload.kdf != KDF {
            return Err(CipherError::UnsupportedFormat(format!("kdf '{}'", payload.kdf)).into());
        }
        if !(PBKDF2_ITERATIONS..=PBKDF2_MAX_ITERATIONS).contains(&payload.iterations) {
            return Err(
                CipherError::UnsupportedFormat(format!("{} iterations", payload.iterations)).into(),
            );
        }
        let nonce = nonce_from(&payload.nonce)?;
        let aad = decode_aad(payload.associated_data.as_deref())?;
        let key = kdf::derive_from_password(password.as_bytes(), &payload.salt, payload.iterations)?;
        aead::open(&key, &nonce, &aad, &payload.ciphertext).map(Zeroizing::new)
    }

    // --- Managed-key encryption ---

    /// Encrypt under the active symmetric key `key_id`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::NotFound` if no active symmetric key exists.
    pub fn encrypt_with_managed_key(
        &self,
        plaintext: &[u8],
        key_id: &str,
        associated_data: Option<&[u8]>,
    ) -> Result<ManagedPayload> {
        let key = self
            .source()?
            .encryption_key(key_id)?
            .ok_or_else(|| KeyError::NotFound(key_id.to_string()))?;
        let aad = associated_data.unwrap_or_default();
        let (ciphertext, nonce) = aead::seal(&key, aad, plaintext)?;
        debug!(key_id, "encrypted with managed key");

        Ok(ManagedPayload {
            version: PAYLOAD_VERSION.to_string(),
            algorithm: ALGORITHM.to_string(),
            key_id: key_id.to_string(),
            nonce: nonce.to_vec(),
            ciphertext,
            associated_data: associated_data.map(hex::encode),
        })
    }

    /// Decrypt a [`ManagedPayload`] with the key its `key_id` names.
    ///
    /// Archived generations are accepted, so a payload relabelled with an
    /// archived name still decrypts after rotation.
    pub fn decrypt_with_managed_key(&self, payload: &ManagedPayload) -> Result<Zeroizing<Vec<u8>>> {
        check_format(&payload.version, &payload.algorithm)?;
        let key = self
            .source()?
            .decryption_key(&payload.key_id)?
            .ok_or_else(|| KeyError::NotFound(payload.key_id.clone()))?;
        let nonce = nonce_from(&payload.nonce)?;
        let aad = decode_aad(payload.associated_data.as_deref())?;
        aead::open(&key, &nonce, &aad, &payload.ciphertext).map(Zeroizing::new)
    }

    // --- Key wrapping ---

    /// Wrap symmetric key bytes for `recipient_public_pem` (RSA-OAEP, SHA-256).
    ///
    /// # Errors
    ///
    /// Returns `CipherError::WeakKey` for moduli under 3072 bits.
    pub fn wrap_key(&self, key_bytes: &[u8], recipient_public_pem: &str) -> Result<Vec<u8>> {
        cipher::rsa::wrap(key_bytes, recipient_public_pem)
    }

    /// Unwrap bytes produced by [`Self::wrap_key`].
    ///
    /// # Errors
    ///
    /// Returns `CipherError::KeyUnwrap` for a wrong key, wrong passphrase or
    /// corrupted input.
    pub fn unwrap_key(
        &self,
        wrapped: &[u8],
        recipient_private_pem: &str,
        passphrase: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        cipher::rsa::unwrap(wrapped, recipient_private_pem, passphrase)
    }

    /// Encrypt a PKCS#8 private key PEM under `passphrase`.
    pub fn protect_private_pem(&self, private_pem: &str, passphrase: &str) -> Result<Zeroizing<String>> {
        cipher::rsa::protect(private_pem, passphrase)
    }

    // --- Integrity ---

    /// HMAC-SHA256 of `data` under the managed key `hmac_key_id`, as hex.
    pub fn compute_hmac(&self, data: &[u8], hmac_key_id: &str) -> Result<HexString> {
        let key = self.hmac_key(hmac_key_id)?;
        Ok(mac::sign_hex(&key[..], data))
    }

    /// Constant-time check of `expected_hex` against `data`.
    pub fn verify_hmac(&self, data: &[u8], expected_hex: &str, hmac_key_id: &str) -> Result<bool> {
        let key = self.hmac_key(hmac_key_id)?;
        Ok(mac::verify_hex(&key[..], data, expected_hex))
    }

    fn hmac_key(&self, key_id: &str) -> Result<SymmetricKey> {
        self.source()?
            .hmac_key(key_id)?
            .ok_or_else(|| KeyError::NotFound(key_id.to_string()).into())
    }
}

fn check_format(version: &str, algorithm: &str) -> Result<()> {
    if version != PAYLOAD_VERSION {
        return Err(CipherError::UnsupportedFormat(format!("version '{version}'")).into());
    }
    if algorithm != ALGORITHM {
        return Err(CipherError::UnsupportedFormat(format!("algorithm '{algorithm}'")).into());
    }
    Ok(())
}

fn nonce_from(bytes: &[u8]) -> Result<[u8; NONCE_SIZE]> {
    bytes
        .try_into()
        .map_err(|_| CipherError::UnsupportedFormat(format!("nonce of {} bytes", bytes.len())).into())
}

fn decode_aad(hex_aad: Option<&str>) -> Result<Vec<u8>> {
    match hex_aad {
        Some(h) => hex::decode(h)
            .map_err(|_| CipherError::UnsupportedFormat("associated data is not hex".to_string()).into()),
        None => Ok(Vec::new()),
    }
}
