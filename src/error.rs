//! Error types.
//!
//! Errors are grouped by concern and wrapped by the top-level [`Error`].
//! Cryptographic and integrity failures always propagate; nothing in this
//! crate degrades to a plaintext fallback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the cryptographic primitives.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("crypto error: password must not be empty")]
    EmptyPassword,

    #[error("crypto error: {0}")]
    InvalidInput(String),

    /// Deliberately opaque: wrong password and corrupted data look the same.
    #[error("decryption failed: invalid key or corrupted data")]
    DecryptionFailed,

    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    #[error("crypto error: RSA key too small ({bits} bits, need at least {minimum})")]
    WeakKey { bits: usize, minimum: usize },

    #[error("unsupported payload format: {0}")]
    UnsupportedFormat(String),

    #[error("crypto error: system random generator failed")]
    Rng,
}

/// Errors raised by key lifecycle operations.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("no active key found for '{0}'")]
    NotFound(String),

    #[error("unsupported key type for rotation: {0}")]
    UnsupportedType(String),

    #[error("an active key named '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid key name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("not enough shares: {provided} supplied, {required} required")]
    Threshold { required: u8, provided: usize },

    #[error("invalid share: {0}")]
    InvalidShare(String),

    #[error("key generation failed: {0}")]
    GenerationFailed(String),
}

/// Errors raised by on-disk stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("failed to read store file: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("failed to write store file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("invalid store format: {0}")]
    InvalidFormat(String),

    #[error("secret '{0}' not found or expired")]
    SecretNotFound(String),

    #[error("invalid secret name '{name}': {reason}")]
    InvalidSecretName { name: String, reason: String },

    #[error("insecure permissions on {path}: expected {expected}, found {actual}")]
    InsecurePermissions {
        path: String,
        expected: String,
        actual: String,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("could not determine a store root: {0}")]
    NoRoot(String),
}

/// Top-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl Error {
    /// True for AEAD/HMAC failures and tampered stores.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::Cipher(CipherError::DecryptionFailed) | Error::Store(StoreError::Integrity(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_message_is_opaque() {
        let msg = CipherError::DecryptionFailed.to_string();
        assert!(!msg.contains("password"));
        assert!(msg.contains("decryption failed"));
    }

    #[test]
    fn test_threshold_message() {
        let err: Error = KeyError::Threshold {
            required: 3,
            provided: 2,
        }
        .into();
        assert_eq!(err.to_string(), "not enough shares: 2 supplied, 3 required");
    }

    #[test]
    fn test_integrity_classification() {
        assert!(Error::from(CipherError::DecryptionFailed).is_integrity_failure());
        assert!(Error::from(StoreError::Integrity("x".into())).is_integrity_failure());
        assert!(!Error::from(KeyError::NotFound("k".into())).is_integrity_failure());
    }
}
