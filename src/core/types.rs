//! Type aliases for domain concepts.
//!
//! Provides semantic type aliases to make function signatures more descriptive.

/// Name of a managed key (e.g., `db`, `payments_signing`).
///
/// Also used as the file stem of the encrypted key record.
pub type KeyName = String;

/// Name of an application secret held by the vault (e.g., `stripe.api_key`).
pub type SecretName = String;

/// Identifier of whoever performed an audited action.
pub type ActorId = String;

/// Lowercase hex string (HMAC digests, nonces, ciphertexts in payloads).
pub type HexString = String;
