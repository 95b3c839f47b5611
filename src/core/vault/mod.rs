//! Encrypted store for application secrets.
//!
//! [`SecretVault`] keeps named string secrets (API tokens, database
//! passwords) in one consolidated file, `vault/secrets.enc`. It is
//! independent of the managed keys and owns its own key, `vault/vault.key`.
//!
//! Every value is sealed under a key derived with HKDF from the vault key
//! and the secret's context; the whole store is sealed again under a
//! derived file key. Any authentication failure is a
//! [`StoreError::Integrity`], after which the vault tries its `.bak` pair.

mod access;
mod migration;
mod record;
mod rotation;
mod secrets;

pub use access::{AccessRecord, READ, STORE};
pub use migration::MigrationReport;
pub use record::{SecretInfo, SecretRecord, SecretStore, VaultHealth};

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::core::audit::{action, AuditLogger, AuditStatus};
use crate::core::cipher::{self, aead, kdf, SymmetricKey};
use crate::core::config::{Config, VaultConfig};
use crate::core::constants::KEY_SIZE;
use crate::core::fsutil;
use crate::core::layout::StoreLayout;
use crate::core::lock::{LockGuard, StoreLock};
use crate::core::types::ActorId;
use crate::error::{Error, Result, StoreError};

/// Derivation context of the store file key.
pub(super) const FILE_CONTEXT: &str = "secrets_file";

/// Associated data of the sealed store file.
pub(super) const FILE_AAD: &[u8] = b"vaultkeeper:secrets";

/// Application secret store for one store root.
pub struct SecretVault {
    pub(super) layout: StoreLayout,
    pub(super) config: VaultConfig,
    pub(super) lock_timeout: Duration,
    pub(super) actor: ActorId,
    pub(super) audit: Arc<AuditLogger>,
    pub(super) key: RwLock<SymmetricKey>,
    pub(super) derived: Mutex<HashMap<String, SymmetricKey>>,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault")
            .field("root", &self.layout.root())
            .field("actor", &self.actor)
            .finish()
    }
}

impl SecretVault {
    /// Open the vault, creating its key on first use.
    ///
    /// Runs the one-time legacy config migration when `vault.legacy_configs`
    /// is set and the migration flag is absent. An invalid config is rejected
    /// before anything is written.
    pub fn open(layout: &StoreLayout, config: &Config, audit: Arc<AuditLogger>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(layout.vault_dir()).map_err(StoreError::WriteFailed)?;

        let vault = Self {
            layout: layout.clone(),
            config: config.vault.clone(),
            lock_timeout: config.lock.timeout(),
            actor: config.vault.actor.clone(),
            audit,
            key: RwLock::new(Zeroizing::new([0u8; KEY_SIZE])),
            derived: Mutex::new(HashMap::new()),
        };
        let key = vault.load_or_create_key()?;
        *vault.key.write().unwrap_or_else(|e| e.into_inner()) = key;

        vault.auto_migrate()?;
        Ok(vault)
    }

    /// Record `actor` as the accessor of subsequent operations.
    pub fn with_actor(mut self, actor: impl Into<ActorId>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    fn load_or_create_key(&self) -> Result<SymmetricKey> {
        let path = self.layout.vault_key();
        if !path.exists() {
            let _guard = self.lock()?;
            if !path.exists() {
                let key = cipher::random_key()?;
                fsutil::atomic_write(&path, &key[..], true)?;
                warn!(path = %path.display(), "created new vault key");
                return Ok(key);
            }
        }
        read_vault_key(&path)
    }

    /// Take the vault lock and pick up a key rotated by another instance.
    pub(super) fn lock(&self) -> Result<LockGuard> {
        let guard = StoreLock::new(self.layout.vault_lock(), self.lock_timeout).acquire()?;
        self.sync_key()?;
        Ok(guard)
    }

    /// Reload `vault.key` when it no longer matches the cached key.
    fn sync_key(&self) -> Result<()> {
        let path = self.layout.vault_key();
        if !path.exists() {
            return Ok(());
        }
        let on_disk = read_vault_key(&path)?;
        if *on_disk != *self.current_key() {
            debug!("vault key changed on disk, reloading");
            self.replace_key(on_disk);
        }
        Ok(())
    }

    // --- Key derivation ---

    /// Sub-key for `context`, cached until the next rotation.
    pub(super) fn derived_key(&self, context: &str) -> Result<SymmetricKey> {
        let mut cache = self.derived.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = cache.get(context) {
            return Ok(key.clone());
        }
        let key = kdf::derive_subkey(&self.current_key(), context)?;
        cache.insert(context.to_string(), key.clone());
        Ok(key)
    }

    pub(super) fn current_key(&self) -> SymmetricKey {
        self.key.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(super) fn replace_key(&self, key: SymmetricKey) {
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = key;
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    // --- Store file ---

    /// Decrypt the store, recovering from the backup pair on integrity failure.
    ///
    /// Caller holds the vault lock, so the cached key matches `vault.key`
    /// and a failure here means the store itself is bad. A missing store
    /// file is an empty store.
    pub(super) fn load_store(&self) -> Result<SecretStore> {
        match self.read_store() {
            Err(e) if e.is_integrity_failure() => {
                error!(error = %e, "secrets store failed authentication");
                self.recover_from_backup(e)
            }
            other => other,
        }
    }

    fn read_store(&self) -> Result<SecretStore> {
        let path = self.layout.secrets_file();
        let blob = match fs::read(&path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SecretStore::new()),
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };
        open_store(&self.derived_key(FILE_CONTEXT)?, &blob)
    }

    pub(super) fn save_store(&self, store: &SecretStore) -> Result<()> {
        let blob = seal_store(&self.derived_key(FILE_CONTEXT)?, store)?;
        fsutil::atomic_write(&self.layout.secrets_file(), &blob, true)
    }

    /// Copy the current key and store to their `.bak` siblings.
    ///
    /// Called before each mutation, so the pair always holds the last state
    /// that authenticated.
    pub(super) fn write_backup(&self) -> Result<()> {
        let store = self.layout.secrets_file();
        if !store.exists() {
            return Ok(());
        }
        let blob = fs::read(&store).map_err(StoreError::ReadFailed)?;
        fsutil::atomic_write(&self.layout.vault_key_backup(), &self.current_key()[..], true)?;
        fsutil::atomic_write(&self.layout.secrets_backup(), &blob, true)?;
        debug!("wrote vault backup");
        Ok(())
    }

    /// Reinstate the backup pair if it authenticates, otherwise return `cause`.
    fn recover_from_backup(&self, cause: Error) -> Result<SecretStore> {
        let backup = self.layout.secrets_backup();
        let Ok(blob) = fs::read(&backup) else {
            return Err(integrity(cause));
        };
        let key = match read_vault_key(&self.layout.vault_key_backup()) {
            Ok(key) => key,
            Err(_) => self.current_key(),
        };
        let file_key = kdf::derive_subkey(&key, FILE_CONTEXT)?;
        let store = match open_store(&file_key, &blob) {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "vault backup failed authentication too");
                return Err(integrity(cause));
            }
        };

        fsutil::atomic_write(&self.layout.vault_key(), &key[..], true)?;
        fsutil::atomic_write(&self.layout.secrets_file(), &blob, true)?;
        self.replace_key(key);

        warn!(secrets = store.secrets.len(), "recovered secrets store from backup");
        self.audit.log(
            &self.actor,
            action::VAULT_RECOVERED,
            "vault",
            AuditStatus::Warning,
            json!({ "cause": cause.to_string(), "count": store.secrets.len() }),
        );
        Ok(store)
    }

    // --- Health ---

    /// Current state of the vault.
    pub fn health(&self) -> Result<VaultHealth> {
        let store = {
            let _guard = self.lock()?;
            self.load_store()?
        };
        let since = chrono::Utc::now() - store.last_rotation;
        let health = VaultHealth {
            secrets: store.secrets.len(),
            days_since_rotation: since.num_days(),
            rotation_due: since >= chrono::Duration::days(self.config.rotation_interval_days),
            store_exists: self.layout.secrets_file().exists(),
            backup_exists: self.layout.secrets_backup().exists(),
        };
        info!(secrets = health.secrets, rotation_due = health.rotation_due, "vault health");
        Ok(health)
    }
}

pub(super) fn seal_store(file_key: &SymmetricKey, store: &SecretStore) -> Result<Vec<u8>> {
    let json = Zeroizing::new(serde_json::to_vec(store)?);
    aead::seal_blob(file_key, FILE_AAD, &json)
}

pub(super) fn open_store(file_key: &SymmetricKey, blob: &[u8]) -> Result<SecretStore> {
    let json = Zeroizing::new(aead::open_blob(file_key, FILE_AAD, blob).map_err(integrity)?);
    serde_json::from_slice(&json).map_err(|e| {
        StoreError::Integrity(format!("secrets store content is not valid: {e}")).into()
    })
}

/// Map decryption and format failures of a vault file to `StoreError::Integrity`.
pub(super) fn integrity(err: Error) -> Error {
    match err {
        Error::Cipher(e) => StoreError::Integrity(e.to_string()).into(),
        other => other,
    }
}

pub(super) fn read_vault_key(path: &std::path::Path) -> Result<SymmetricKey> {
    let bytes = Zeroizing::new(fsutil::read_key_file(path)?);
    if bytes.len() != KEY_SIZE {
        return Err(StoreError::InvalidFormat(format!(
            "vault key {} has {} bytes, expected {KEY_SIZE}",
            path.display(),
            bytes.len()
        ))
        .into());
    }
    cipher::key_from_slice(&bytes)
}
