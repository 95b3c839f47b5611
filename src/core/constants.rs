//! Constants used throughout vaultkeeper.
//!
//! Centralizes file names, format versions and cryptographic sizes.

/// Configuration file name inside a store root.
pub const CONFIG_FILE: &str = "vaultkeeper.toml";

/// Default store root relative to HOME (~/.vaultkeeper).
pub const DEFAULT_ROOT_DIR: &str = ".vaultkeeper";

/// Environment variable overriding the store root.
pub const ROOT_ENV: &str = "VAULTKEEPER_ROOT";

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "VAULTKEEPER_LOG";

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Salt size for password-based key derivation.
pub const PASSWORD_SALT_SIZE: usize = 16;

/// Salt size for managed salts.
pub const MANAGED_SALT_SIZE: usize = 32;

/// PBKDF2-HMAC-SHA256 iteration count for password encryption.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Upper bound on the iteration count accepted from a password payload.
pub const PBKDF2_MAX_ITERATIONS: u32 = 10 * PBKDF2_ITERATIONS;

/// Longest accepted rotation interval (about a century).
pub const MAX_ROTATION_INTERVAL_DAYS: i64 = 36_500;

/// RSA modulus size for generated keypairs.
pub const RSA_BITS: usize = 4096;

/// Smallest RSA modulus accepted for key wrapping.
pub const RSA_MIN_BITS: usize = 3072;

/// Leading version byte of every sealed blob written to disk.
pub const BLOB_VERSION: u8 = 0x01;

/// Payload version embedded in self-describing encryption payloads.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Replacement value for redacted fields.
pub const REDACTED: &str = "[REDACTED]";

/// Marker left behind in legacy config files after migration.
pub const MIGRATED_MARKER: &str = "[MOVED_TO_VAULT]";

/// Associated data for the master key check value.
pub const MASTER_CHECK_AAD: &[u8] = b"vaultkeeper:master-check";

/// Key-name fragments that mark a field as sensitive (case-insensitive).
pub const SENSITIVE_TERMS: &[&str] = &[
    "password",
    "token",
    "api_key",
    "secret",
    "credit_card",
    "ssn",
    "email",
];
