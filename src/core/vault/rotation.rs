//! Vault key rotation.

use std::fs;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

use super::access::{open_line, read_lines, seal_line, ACCESS_CONTEXT};
use super::record::SecretStore;
use super::{integrity, seal_store, SecretVault, FILE_CONTEXT};
use crate::core::audit::{action, AuditStatus};
use crate::core::cipher::{self, aead, kdf, SymmetricKey};
use crate::core::fsutil;
use crate::error::{Result, StoreError};

impl SecretVault {
    /// Rotate the vault key if `vault.rotation_interval_days` have passed
    /// since the last rotation.
    ///
    /// Returns true when a rotation happened.
    pub fn rotate_keys(&self) -> Result<bool> {
        let _guard = self.lock()?;
        let store = self.load_store()?;
        let interval = Duration::days(self.config.rotation_interval_days);
        if Utc::now() - store.last_rotation < interval {
            debug!(last_rotation = %store.last_rotation, "vault rotation not due");
            return Ok(false);
        }
        self.rotate_locked(store)?;
        Ok(true)
    }

    /// Rotate the vault key regardless of the interval.
    pub fn force_rotate_keys(&self) -> Result<()> {
        let _guard = self.lock()?;
        let store = self.load_store()?;
        self.rotate_locked(store)
    }

    /// Re-encrypt every secret and the access log under a fresh vault key.
    ///
    /// The current pair is copied to `.bak` first. On any failure the pair
    /// and the access log are put back and the old key stays live.
    fn rotate_locked(&self, store: SecretStore) -> Result<()> {
        self.write_backup()?;
        let old_key = self.current_key();
        let access_path = self.layout.access_log();
        let access_before = match fs::read(&access_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };

        let count = store.secrets.len();
        match self.reencrypt(&old_key, store) {
            Ok(new_key) => {
                self.replace_key(new_key);
                info!(secrets = count, "rotated vault key");
                self.audit.log(
                    &self.actor,
                    action::VAULT_KEYS_ROTATED,
                    "vault",
                    AuditStatus::Success,
                    json!({ "rotated_count": count }),
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "vault rotation failed, restoring backup");
                let restored = self.restore_pre_rotation(&old_key, access_before.as_deref());
                self.audit.log(
                    &self.actor,
                    action::VAULT_ROTATION_FAILED,
                    "vault",
                    AuditStatus::Failure,
                    json!({ "error": e.to_string(), "restored": restored.is_ok() }),
                );
                if let Err(restore_err) = restored {
                    error!(error = %restore_err, "failed to restore vault backup");
                }
                Err(e)
            }
        }
    }

    fn reencrypt(&self, old_key: &SymmetricKey, mut store: SecretStore) -> Result<SymmetricKey> {
        let new_key = cipher::random_key()?;
        let now = Utc::now();

        for (name, record) in store.secrets.iter_mut() {
            let old = kdf::derive_subkey(old_key, &record.context)?;
            let plaintext = Zeroizing::new(
                aead::open_blob(&old, name.as_bytes(), &record.value).map_err(integrity)?,
            );
            let new = kdf::derive_subkey(&new_key, &record.context)?;
            record.value = aead::seal_blob(&new, name.as_bytes(), &plaintext)?;
            record.rotated_at = Some(now);
        }
        store.last_rotation = now;

        let old_access = kdf::derive_subkey(old_key, ACCESS_CONTEXT)?;
        let new_access = kdf::derive_subkey(&new_key, ACCESS_CONTEXT)?;
        let mut access = String::new();
        for line in read_lines(&self.layout.access_log())? {
            let entry = open_line(&old_access, &line)?;
            access.push_str(&seal_line(&new_access, &entry)?);
            access.push('\n');
        }

        let blob = seal_store(&kdf::derive_subkey(&new_key, FILE_CONTEXT)?, &store)?;
        fsutil::atomic_write(&self.layout.vault_key(), &new_key[..], true)?;
        fsutil::atomic_write(&self.layout.secrets_file(), &blob, true)?;
        if !access.is_empty() {
            fsutil::atomic_write(&self.layout.access_log(), access.as_bytes(), true)?;
        }
        Ok(new_key)
    }

    fn restore_pre_rotation(&self, old_key: &SymmetricKey, access: Option<&[u8]>) -> Result<()> {
        fsutil::atomic_write(&self.layout.vault_key(), &old_key[..], true)?;
        let backup = self.layout.secrets_backup();
        if backup.exists() {
            let blob = fs::read(&backup).map_err(StoreError::ReadFailed)?;
            fsutil::atomic_write(&self.layout.secrets_file(), &blob, true)?;
        }
        if let Some(bytes) = access {
            fsutil::atomic_write(&self.layout.access_log(), bytes, true)?;
        }
        self.replace_key(old_key.clone());
        Ok(())
    }
}
