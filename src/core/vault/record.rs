//! Secret records and the consolidated store.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::SecretName;

/// One stored secret. `value` is a sealed blob, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    #[serde(with = "hex")]
    pub value: Vec<u8>,
    /// Context the value's encryption key was derived from.
    pub context: String,
    pub stored_at: DateTime<Utc>,
    #[serde(default)]
    pub ttl_days: Option<u32>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rotated_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    /// True once `ttl_days` have elapsed since `stored_at`.
    ///
    /// A TTL of zero days is expired immediately.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_days {
            Some(days) => now - self.stored_at >= Duration::days(i64::from(days)),
            None => false,
        }
    }
}

/// Decrypted content of `secrets.enc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStore {
    pub last_rotation: DateTime<Utc>,
    #[serde(default)]
    pub secrets: BTreeMap<SecretName, SecretRecord>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self {
            last_rotation: Utc::now(),
            secrets: BTreeMap::new(),
        }
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Secret metadata returned by listings. Carries no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretInfo {
    pub name: SecretName,
    pub context: String,
    pub stored_at: DateTime<Utc>,
    pub ttl_days: Option<u32>,
    pub access_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// Snapshot of vault state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultHealth {
    pub secrets: usize,
    pub days_since_rotation: i64,
    pub rotation_due: bool,
    pub store_exists: bool,
    pub backup_exists: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ttl_days: Option<u32>, age_days: i64) -> SecretRecord {
        SecretRecord {
            value: vec![1, 2, 3],
            context: "secret_x".to_string(),
            stored_at: Utc::now() - Duration::days(age_days),
            ttl_days,
            access_count: 0,
            last_accessed: None,
            rotated_at: None,
        }
    }

    #[test]
    fn test_no_ttl_never_expires() {
        assert!(!record(None, 10_000).is_expired(Utc::now()));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        assert!(record(Some(0), 0).is_expired(Utc::now()));
    }

    #[test]
    fn test_ttl_boundary() {
        assert!(!record(Some(7), 6).is_expired(Utc::now()));
        assert!(record(Some(7), 7).is_expired(Utc::now()));
    }

    #[test]
    fn test_value_serialized_as_hex() {
        let json = serde_json::to_value(record(None, 0)).unwrap();
        assert_eq!(json["value"], "010203");
    }
}
