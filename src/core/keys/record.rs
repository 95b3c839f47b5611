//! Managed key records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroize;

use crate::core::types::KeyName;
use crate::error::{KeyError, Result};

/// Kind of key material, used to pick what a rotation generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Symmetric,
    RsaKeypair,
    Salt,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Symmetric => "symmetric",
            KeyType::RsaKeypair => "rsa_keypair",
            KeyType::Salt => "salt",
        }
    }

    /// Human-readable algorithm label recorded in audit details.
    pub fn algorithm(&self) -> &'static str {
        match self {
            KeyType::Symmetric => "AES-256-GCM",
            KeyType::RsaKeypair => "RSA-4096",
            KeyType::Salt => "SALT-256",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "symmetric" => Some(KeyType::Symmetric),
            "rsa_keypair" => Some(KeyType::RsaKeypair),
            "salt" => Some(KeyType::Salt),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw key material, tagged by type on disk. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyMaterial {
    Symmetric {
        #[serde(with = "hex")]
        key: Vec<u8>,
    },
    RsaKeypair {
        private_pem: String,
        public_pem: String,
    },
    Salt {
        #[serde(with = "hex")]
        salt: Vec<u8>,
    },
}

impl KeyMaterial {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyMaterial::Symmetric { .. } => KeyType::Symmetric,
            KeyMaterial::RsaKeypair { .. } => KeyType::RsaKeypair,
            KeyMaterial::Salt { .. } => KeyType::Salt,
        }
    }
}

impl Zeroize for KeyMaterial {
    fn zeroize(&mut self) {
        match self {
            KeyMaterial::Symmetric { key } => key.zeroize(),
            KeyMaterial::RsaKeypair { private_pem, .. } => private_pem.zeroize(),
            KeyMaterial::Salt { salt } => salt.zeroize(),
        }
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial::{}([REDACTED])", self.key_type())
    }
}

/// One generation of a named key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedKey {
    pub name: KeyName,
    #[serde(flatten)]
    pub material: KeyMaterial,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub rotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl ManagedKey {
    /// Fresh active record created now.
    pub fn new(name: impl Into<KeyName>, material: KeyMaterial) -> Self {
        Self {
            name: name.into(),
            material,
            created_at: Utc::now(),
            active: true,
            rotated_at: None,
            destroyed_at: None,
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.material.key_type()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Decode a decrypted record.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::UnsupportedType` when the type tag is unknown.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if KeyType::from_tag(&tag).is_none() {
            return Err(KeyError::UnsupportedType(tag).into());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn summary(&self) -> KeySummary {
        KeySummary {
            name: self.name.clone(),
            key_type: self.key_type(),
            created_at: self.created_at,
            active: self.active,
            rotated_at: self.rotated_at,
            destroyed_at: self.destroyed_at,
        }
    }
}

/// Record metadata without key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub name: KeyName,
    pub key_type: KeyType,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub rotated_at: Option<DateTime<Utc>>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl KeySummary {
    pub fn state(&self) -> &'static str {
        if self.destroyed_at.is_some() {
            "destroyed"
        } else if self.active {
            "active"
        } else {
            "archived"
        }
    }
}
