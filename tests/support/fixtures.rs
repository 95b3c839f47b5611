//! Test fixtures and constants.

use vaultkeeper::core::config::Config;

/// Secrets used across vault tests.
pub const STANDARD_SECRETS: &[(&str, &str)] = &[
    ("database.password", "postgres-pass-123"),
    ("stripe.api_key", "sk_live_51H8abc"),
    ("paypal.client_secret", "pp-client-secret"),
    ("jwt.signing_token", "super-secret-jwt-token"),
];

/// Legacy JSON config with plaintext credentials.
pub const LEGACY_CONFIG: &str = r#"{
  "stripe": { "api_key": "sk_live_legacy", "currency": "usd" },
  "database": { "host": "db.internal", "port": 5432, "password": "legacy-db-pass" },
  "webhooks": [ { "url": "https://example.test/hook", "token": "whk-1" } ]
}"#;

/// Configuration using the smallest RSA modulus the crate accepts.
pub fn fast_rsa_config() -> Config {
    let mut config = Config::default();
    config.keys.rsa_bits = 3072;
    config
}
