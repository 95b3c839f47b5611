//! Key generation, rotation and destruction.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{validate_name, KeyManager, KeyMaterial, KeyType, ManagedKey};
use crate::core::audit::{action, AuditStatus};
use crate::core::cipher::{self, rsa, SymmetricKey};
use crate::core::constants::MANAGED_SALT_SIZE;
use crate::core::types::KeyName;
use crate::error::{KeyError, Result};

impl KeyManager {
    // --- Generation ---

    /// Generate and store a 256-bit AES key under `name`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::AlreadyExists` if `name` already has an active key.
    pub fn generate_symmetric_key(&self, name: &str) -> Result<SymmetricKey> {
        let record = self.generate(name, KeyType::Symmetric, action::KEY_GENERATED)?;
        match &record.material {
            KeyMaterial::Symmetric { key } => cipher::key_from_slice(key),
            _ => Err(KeyError::GenerationFailed("unexpected key type".to_string()).into()),
        }
    }

    /// Generate and store an RSA keypair under `name`.
    ///
    /// Returns `(private_pem, public_pem)`.
    pub fn generate_key_pair(&self, name: &str) -> Result<(Zeroizing<String>, String)> {
        let record = self.generate(name, KeyType::RsaKeypair, action::KEY_GENERATED)?;
        match &record.material {
            KeyMaterial::RsaKeypair {
                private_pem,
                public_pem,
            } => Ok((Zeroizing::new(private_pem.clone()), public_pem.clone())),
            _ => Err(KeyError::GenerationFailed("unexpected key type".to_string()).into()),
        }
    }

    /// Generate and store a 256-bit random salt under `name`.
    pub fn generate_salt(&self, name: &str) -> Result<Vec<u8>> {
        let record = self.generate(name, KeyType::Salt, action::SALT_GENERATED)?;
        match &record.material {
            KeyMaterial::Salt { salt } => Ok(salt.clone()),
            _ => Err(KeyError::GenerationFailed("unexpected key type".to_string()).into()),
        }
    }

    fn generate(&self, name: &str, key_type: KeyType, audit_action: &str) -> Result<ManagedKey> {
        validate_name(name)?;
        self.ensure_master_matches()?;

        let record = {
            let _guard = self.lock(self.layout.keys_lock())?;
            self.refresh_record(name)?;
            self.ensure_master_matches()?;
            if let Some(tag) = self.unsupported_tag(name) {
                return Err(KeyError::UnsupportedType(tag).into());
            }
            let mut records = self.write_records();
            let master = self.master_key();

            match records.get(name).map(|r| r.active) {
                Some(true) => return Err(KeyError::AlreadyExists(name.to_string()).into()),
                Some(false) => {
                    // Keep the inactive generation under its own name.
                    self.archive(&master, &mut records, name, None)?;
                }
                None => {}
            }

            let record = ManagedKey::new(name, self.generate_material(key_type)?);
            self.persist(&master, &record)?;
            records.insert(name.to_string(), record.clone());
            record
        };

        info!(name, key_type = %key_type, "generated key");
        self.audit.log(
            &self.actor,
            audit_action,
            &format!("key:{name}"),
            AuditStatus::Success,
            json!({ "key_name": name, "type": key_type.algorithm() }),
        );
        Ok(record)
    }

    pub(super) fn generate_material(&self, key_type: KeyType) -> Result<KeyMaterial> {
        Ok(match key_type {
            KeyType::Symmetric => KeyMaterial::Symmetric {
                key: cipher::random_key()?.to_vec(),
            },
            KeyType::RsaKeypair => {
                let pair = rsa::generate(self.config.rsa_bits)?;
                KeyMaterial::RsaKeypair {
                    private_pem: pair.private_pem.to_string(),
                    public_pem: pair.public_pem,
                }
            }
            KeyType::Salt => KeyMaterial::Salt {
                salt: cipher::random_bytes::<MANAGED_SALT_SIZE>()?.to_vec(),
            },
        })
    }

    // --- Rotation ---

    /// Archive the active key under `<name>_old_<unix-seconds>` and activate a
    /// fresh key of the same type under `name`.
    ///
    /// Returns the archived name.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::NotFound` if `name` has no active key, or
    /// `KeyError::UnsupportedType` if its record has an unknown type.
    pub fn rotate_key(&self, name: &str) -> Result<KeyName> {
        self.rotate(name, true)?
            .ok_or_else(|| KeyError::NotFound(name.to_string()).into())
    }

    /// Rotate `name` only if it is still due once the lock is held.
    pub(super) fn rotate_if_due(&self, name: &str) -> Result<Option<KeyName>> {
        self.rotate(name, false)
    }

    fn rotate(&self, name: &str, force: bool) -> Result<Option<KeyName>> {
        self.ensure_master_matches()?;

        let (archived, key_type) = {
            let _guard = self.lock(self.layout.keys_lock())?;
            self.refresh_record(name)?;
            self.ensure_master_matches()?;
            if let Some(tag) = self.unsupported_tag(name) {
                return Err(KeyError::UnsupportedType(tag).into());
            }
            let mut records = self.write_records();
            let master = self.master_key();

            let key_type = match records.get(name) {
                Some(current) if current.active && (force || self.is_due(current)) => {
                    current.key_type()
                }
                Some(current) if current.active => return Ok(None),
                _ if force => return Err(KeyError::NotFound(name.to_string()).into()),
                _ => return Ok(None),
            };

            let fresh = ManagedKey::new(name, self.generate_material(key_type)?);
            let archived = self.archive(&master, &mut records, name, Some(Utc::now()))?;
            self.persist(&master, &fresh)?;
            records.insert(name.to_string(), fresh);
            (archived, key_type)
        };

        self.write_schedule()?;
        info!(name, archived = %archived, "rotated key");
        self.audit.log(
            &self.actor,
            action::KEY_ROTATED,
            &format!("key:{name}"),
            AuditStatus::Success,
            json!({
                "key_name": name,
                "archived_as": archived,
                "type": key_type.algorithm(),
            }),
        );
        Ok(Some(archived))
    }

    fn unsupported_tag(&self, name: &str) -> Option<String> {
        self.unsupported
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Move the record at `name` to a fresh archive name, deactivating it.
    fn archive(
        &self,
        master: &SymmetricKey,
        records: &mut BTreeMap<KeyName, ManagedKey>,
        name: &str,
        rotated_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<KeyName> {
        let Some(mut old) = records.remove(name) else {
            return Err(KeyError::NotFound(name.to_string()).into());
        };

        let base = format!("{name}_old_{}", Utc::now().timestamp());
        let mut archived = base.clone();
        let mut n = 2;
        while records.contains_key(&archived) || self.layout.key_file(&archived).exists() {
            archived = format!("{base}_{n}");
            n += 1;
        }

        old.name = archived.clone();
        if old.active {
            old.active = false;
            old.rotated_at = rotated_at.or_else(|| Some(Utc::now()));
        }
        if let Err(e) = self.persist(master, &old) {
            old.name = name.to_string();
            records.insert(name.to_string(), old);
            return Err(e);
        }
        debug!(name, archived = %archived, "archived key generation");
        records.insert(archived.clone(), old);
        Ok(archived)
    }

    // --- Destruction ---

    /// Deactivate `name` and mark it destroyed.
    ///
    /// The sealed record stays on disk for forensic purposes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::NotFound` if `name` has no active key.
    pub fn destroy_key(&self, name: &str) -> Result<()> {
        self.ensure_master_matches()?;
        {
            let _guard = self.lock(self.layout.keys_lock())?;
            self.refresh_record(name)?;
            self.ensure_master_matches()?;
            let mut records = self.write_records();
            let record = records
                .get_mut(name)
                .filter(|r| r.active)
                .ok_or_else(|| KeyError::NotFound(name.to_string()))?;

            let mut destroyed = record.clone();
            destroyed.active = false;
            destroyed.destroyed_at = Some(Utc::now());
            self.persist(&self.master_key(), &destroyed)?;
            *record = destroyed;
        }

        info!(name, "destroyed key");
        self.audit.log(
            &self.actor,
            action::KEY_DESTROYED,
            &format!("key:{name}"),
            AuditStatus::Success,
            json!({ "key_name": name }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{manager, manager_with};
    use crate::core::config::Config;
    use crate::core::engine::KeySource;
    use crate::error::{Error, KeyError};
    use tempfile::TempDir;

    #[test]
    fn test_generate_symmetric_key_persists_encrypted() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        let key = km.generate_symmetric_key("db").unwrap();

        let record = km.get_key("db").unwrap().unwrap();
        assert!(record.active);
        assert_eq!(km.symmetric_key("db").unwrap().unwrap(), key);

        let on_disk = std::fs::read(km.layout().key_file("db")).unwrap();
        assert!(!on_disk.windows(32).any(|w| w == &key[..]));
        assert!(!String::from_utf8_lossy(&on_disk).contains(&hex::encode(&key[..])));
    }

    #[test]
    fn test_generate_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        km.generate_symmetric_key("db").unwrap();
        let err = km.generate_symmetric_key("db").unwrap_err();
        assert!(matches!(err, Error::Key(KeyError::AlreadyExists(_))));
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let key = manager(&dir).generate_symmetric_key("db").unwrap();
        let salt = manager(&dir).generate_salt("hashing").unwrap();
        assert_eq!(salt.len(), 32);

        let km = manager(&dir);
        assert_eq!(km.symmetric_key("db").unwrap().unwrap(), key);
        assert_eq!(km.salt("hashing").unwrap().unwrap(), salt);
    }

    #[test]
    fn test_rotate_archives_old_generation() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        let old = km.generate_symmetric_key("db").unwrap();

        let archived = km.rotate_key("db").unwrap();
        assert!(archived.starts_with("db_old_"));

        let new = km.symmetric_key("db").unwrap().unwrap();
        assert_ne!(new, old);

        let record = km.get_record(&archived).unwrap();
        assert!(!record.active);
        assert!(record.rotated_at.is_some());
        assert_eq!(km.decryption_key(&archived).unwrap().unwrap(), old);
        assert_eq!(km.generations("db"), vec![archived]);
    }

    #[test]
    fn test_rotate_twice_in_same_second_gets_unique_names() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        km.generate_salt("s").unwrap();
        let a = km.rotate_key("s").unwrap();
        let b = km.rotate_key("s").unwrap();
        assert_ne!(a, b);
        assert_eq!(km.generations("s").len(), 2);
        assert_eq!(
            km.list_keys().iter().filter(|k| k.active).count(),
            1,
            "exactly one active generation"
        );
    }

    #[test]
    fn test_rotate_missing_key() {
        let dir = TempDir::new().unwrap();
        let err = manager(&dir).rotate_key("nope").unwrap_err();
        assert!(matches!(err, Error::Key(KeyError::NotFound(_))));
    }

    #[test]
    fn test_get_key_auto_rotates_past_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.keys.rotation_interval_days = 0;
        let km = manager_with(&dir, config);
        let first = km.generate_symmetric_key("db").unwrap();

        let second = km.symmetric_key("db").unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(km.generations("db").len(), 1);
    }

    #[test]
    fn test_get_key_does_not_rotate_fresh_key() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        let first = km.generate_symmetric_key("db").unwrap();
        assert_eq!(km.symmetric_key("db").unwrap().unwrap(), first);
        assert!(km.due_for_rotation().is_empty());
    }

    #[test]
    fn test_destroy_keeps_record() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        km.generate_symmetric_key("db").unwrap();
        km.destroy_key("db").unwrap();

        assert!(km.get_key("db").unwrap().is_none());
        let record = km.get_record("db").unwrap();
        assert!(record.destroyed_at.is_some());
        assert!(km.layout().key_file("db").exists());
        assert!(km.decryption_key("db").unwrap().is_none());
        assert!(km.destroy_key("db").is_err());
    }

    #[test]
    fn test_generate_after_destroy_keeps_destroyed_generation() {
        let dir = TempDir::new().unwrap();
        let km = manager(&dir);
        km.generate_symmetric_key("db").unwrap();
        km.destroy_key("db").unwrap();
        km.generate_symmetric_key("db").unwrap();

        let archived = km.generations("db");
        assert_eq!(archived.len(), 1);
        assert!(km.get_record(&archived[0]).unwrap().destroyed_at.is_some());
        assert!(km.get_key("db").unwrap().unwrap().active);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = manager(&dir).generate_symmetric_key("../x").unwrap_err();
        assert!(matches!(err, Error::Key(KeyError::InvalidName { .. })));
    }
}
