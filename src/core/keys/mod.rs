//! Managed key lifecycle.
//!
//! [`KeyManager`] is the only component that reads or writes the master key.
//! Every managed key record is JSON sealed with AES-256-GCM under the master
//! key (aad = key name) and stored in its own file under `keys/`.
//!
//! Per name the lifecycle is `absent -> active -> archived` (by rotation) or
//! `absent -> active -> destroyed`. Inactive generations are never deleted.

mod backup;
mod lifecycle;
mod record;
pub mod shamir;

pub use record::{KeyMaterial, KeySummary, KeyType, ManagedKey};

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::core::audit::{action, AuditLogger, AuditStatus};
use crate::core::cipher::{self, aead, SymmetricKey};
use crate::core::config::{Config, KeysConfig};
use crate::core::constants::{KEY_SIZE, MASTER_CHECK_AAD};
use crate::core::engine::KeySource;
use crate::core::fsutil;
use crate::core::layout::StoreLayout;
use crate::core::lock::{LockGuard, StoreLock};
use crate::core::types::{ActorId, KeyName};
use crate::error::{KeyError, Result, StoreError};

/// Owns the managed keys of one store root.
pub struct KeyManager {
    pub(super) layout: StoreLayout,
    pub(super) config: KeysConfig,
    pub(super) lock_timeout: Duration,
    pub(super) actor: ActorId,
    pub(super) audit: Arc<AuditLogger>,
    pub(super) master: RwLock<SymmetricKey>,
    pub(super) records: RwLock<BTreeMap<KeyName, ManagedKey>>,
    /// Names whose record carries an unknown type tag.
    pub(super) unsupported: RwLock<BTreeMap<KeyName, String>>,
    /// Set when the master key does not match the store's key check value.
    pub(super) mismatch: RwLock<bool>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("root", &self.layout.root())
            .field("actor", &self.actor)
            .field("keys", &self.read_records().len())
            .finish()
    }
}

impl KeyManager {
    /// Open the key store, creating the master key on first use.
    ///
    /// Records that fail to decrypt are skipped and audited as
    /// `KEY_LOAD_ERROR`.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the master key cannot be
    /// read or created.
    pub fn open(layout: &StoreLayout, config: &Config, audit: Arc<AuditLogger>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(layout.keys_dir()).map_err(StoreError::WriteFailed)?;

        let manager = Self {
            layout: layout.clone(),
            config: config.keys.clone(),
            lock_timeout: config.lock.timeout(),
            actor: config.vault.actor.clone(),
            audit,
            master: RwLock::new(Zeroizing::new([0u8; KEY_SIZE])),
            records: RwLock::new(BTreeMap::new()),
            unsupported: RwLock::new(BTreeMap::new()),
            mismatch: RwLock::new(false),
        };

        let (master, created) = manager.load_or_create_master()?;
        let matches = manager.check_master(&master, created)?;
        *manager.master.write().unwrap_or_else(|e| e.into_inner()) = master;
        *manager.mismatch.write().unwrap_or_else(|e| e.into_inner()) = !matches;

        manager.reload()?;
        manager.write_schedule()?;
        Ok(manager)
    }

    /// Record `actor` as the actor of subsequent audit entries.
    pub fn with_actor(mut self, actor: impl Into<ActorId>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    // --- Master key ---

    fn load_or_create_master(&self) -> Result<(SymmetricKey, bool)> {
        let path = self.layout.master_key();
        if path.exists() {
            return Ok((read_master(&path)?, false));
        }

        let created = {
            let _guard = self.lock(self.layout.root_lock())?;
            if path.exists() {
                None
            } else {
                let key = cipher::random_key()?;
                fsutil::atomic_write(&path, &key[..], true)?;
                Some(key)
            }
        };

        match created {
            Some(key) => {
                warn!(path = %path.display(), "created new master key");
                self.audit.log(
                    &self.actor,
                    action::MASTER_KEY_CREATED,
                    "master_key",
                    AuditStatus::Success,
                    json!({}),
                );
                Ok((key, true))
            }
            None => Ok((read_master(&path)?, false)),
        }
    }

    /// Compare `master` against the key check value, writing one if absent.
    ///
    /// A freshly created master never overwrites an existing check value, so
    /// a store whose master key was lost stays recognisable until restored.
    fn check_master(&self, master: &SymmetricKey, created: bool) -> Result<bool> {
        let kcv = self.layout.master_check();
        match fs::read(&kcv) {
            Ok(blob) => {
                let ok = aead::open_blob(master, MASTER_CHECK_AAD, &blob).is_ok();
                if !ok {
                    error!(
                        path = %kcv.display(),
                        created,
                        "master key does not match this store; restore it from backup shares"
                    );
                    self.audit.log(
                        &self.actor,
                        action::MASTER_CHECK_FAILED,
                        "master_key",
                        AuditStatus::Failure,
                        json!({ "created": created }),
                    );
                }
                Ok(ok)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_master_check(&kcv, master)?;
                Ok(true)
            }
            Err(e) => Err(StoreError::ReadFailed(e).into()),
        }
    }

    pub(super) fn ensure_master_matches(&self) -> Result<()> {
        if *self.mismatch.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Integrity(
                "master key does not match this store; restore it from backup shares".to_string(),
            )
            .into());
        }
        Ok(())
    }

    // --- Records ---

    /// Load every record file under `keys/` with the current master key.
    pub(super) fn reload(&self) -> Result<usize> {
        let master = self.master_key();
        let mut records = BTreeMap::new();
        let mut unsupported = BTreeMap::new();

        for name in self.record_names()? {
            match self.read_record(&master, &name) {
                Ok(record) => {
                    records.insert(name, record);
                }
                Err(crate::error::Error::Key(KeyError::UnsupportedType(tag))) => {
                    warn!(name = %name, tag = %tag, "key record has unsupported type");
                    unsupported.insert(name, tag);
                }
                Err(e) => {
                    error!(name = %name, error = %e, "failed to load key record");
                    self.audit.log(
                        &self.actor,
                        action::KEY_LOAD_ERROR,
                        &format!("key:{name}"),
                        AuditStatus::Failure,
                        json!({ "key_name": name, "error": e.to_string() }),
                    );
                }
            }
        }

        let count = records.len();
        debug!(count, "loaded key records");
        *self.write_records() = records;
        *self.unsupported.write().unwrap_or_else(|e| e.into_inner()) = unsupported;
        Ok(count)
    }

    /// Re-read the record of `name` from disk into the cache.
    ///
    /// Another instance on the same root may have generated, rotated or
    /// destroyed it since this one loaded. Mutations call this with the keys
    /// lock held so their decision sees the current record.
    ///
    /// While the master key does not match the store nothing can be
    /// decrypted, so the name is simply dropped from the cache.
    pub(super) fn refresh_record(&self, name: &str) -> Result<()> {
        self.sync_master()?;
        let path = self.layout.key_file(name);
        let mismatch = *self.mismatch.read().unwrap_or_else(|e| e.into_inner());
        let loaded = if path.exists() && !mismatch {
            match self.read_record(&self.master_key(), name) {
                Ok(record) => Some(Ok(record)),
                Err(crate::error::Error::Key(KeyError::UnsupportedType(tag))) => Some(Err(tag)),
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let mut unsupported = self.unsupported.write().unwrap_or_else(|e| e.into_inner());
        let mut records = self.write_records();
        match loaded {
            Some(Ok(record)) => {
                unsupported.remove(name);
                records.insert(name.to_string(), record);
            }
            Some(Err(tag)) => {
                records.remove(name);
                unsupported.insert(name.to_string(), tag);
            }
            None => {
                records.remove(name);
                unsupported.remove(name);
            }
        }
        Ok(())
    }

    /// Pick up a master key restored by another instance.
    fn sync_master(&self) -> Result<()> {
        let path = self.layout.master_key();
        if !path.exists() {
            return Ok(());
        }
        let on_disk = read_master(&path)?;
        if *on_disk == *self.master_key() {
            return Ok(());
        }
        let matches = match fs::read(self.layout.master_check()) {
            Ok(blob) => aead::open_blob(&on_disk, MASTER_CHECK_AAD, &blob).is_ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };
        debug!(matches, "master key changed on disk, reloading");
        *self.master.write().unwrap_or_else(|e| e.into_inner()) = on_disk;
        *self.mismatch.write().unwrap_or_else(|e| e.into_inner()) = !matches;
        self.reload()?;
        Ok(())
    }

    /// File stems of every `*.key.enc` file, sorted.
    pub(super) fn record_names(&self) -> Result<Vec<KeyName>> {
        let entries = match fs::read_dir(self.layout.keys_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::ReadFailed)?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".key.enc")) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub(super) fn read_record(&self, master: &SymmetricKey, name: &str) -> Result<ManagedKey> {
        let blob = fs::read(self.layout.key_file(name)).map_err(StoreError::ReadFailed)?;
        let json = Zeroizing::new(aead::open_blob(master, name.as_bytes(), &blob)?);
        ManagedKey::from_json(&json)
    }

    pub(super) fn persist(&self, master: &SymmetricKey, record: &ManagedKey) -> Result<()> {
        let json = Zeroizing::new(serde_json::to_vec(record)?);
        let blob = aead::seal_blob(master, record.name.as_bytes(), &json)?;
        fsutil::atomic_write(&self.layout.key_file(&record.name), &blob, true)
    }

    pub(super) fn master_key(&self) -> SymmetricKey {
        self.master.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(super) fn read_records(&self) -> RwLockReadGuard<'_, BTreeMap<KeyName, ManagedKey>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn write_records(&self) -> RwLockWriteGuard<'_, BTreeMap<KeyName, ManagedKey>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn lock(&self, path: std::path::PathBuf) -> Result<LockGuard> {
        StoreLock::new(path, self.lock_timeout).acquire()
    }

    pub(super) fn is_due(&self, record: &ManagedKey) -> bool {
        record.age(Utc::now()) >= chrono::Duration::days(self.config.rotation_interval_days)
    }

    /// Rewrite `rotation_schedule.json` with the next rotation time.
    pub(super) fn write_schedule(&self) -> Result<()> {
        let next = Utc::now() + chrono::Duration::days(self.config.rotation_interval_days);
        let body = serde_json::to_vec_pretty(&json!({ "next_rotation": next.to_rfc3339() }))?;
        fsutil::atomic_write(&self.layout.rotation_schedule(), &body, false)
    }

    // --- Lookup ---

    /// Active record for `name`, rotating it first when it is past the
    /// rotation interval.
    ///
    /// Returns `Ok(None)` when no active record exists.
    pub fn get_key(&self, name: &str) -> Result<Option<ManagedKey>> {
        self.refresh_record(name)?;
        let due = match self.read_records().get(name) {
            Some(record) if record.active => self.is_due(record),
            _ => return Ok(None),
        };
        if due {
            info!(name, "key is past its rotation interval, rotating");
            self.rotate_if_due(name)?;
        }
        Ok(self.read_records().get(name).filter(|r| r.active).cloned())
    }

    /// Active AES key bytes for `name`.
    pub fn symmetric_key(&self, name: &str) -> Result<Option<SymmetricKey>> {
        Ok(self.get_key(name)?.and_then(|record| match &record.material {
            KeyMaterial::Symmetric { key } => cipher::key_from_slice(key).ok(),
            _ => None,
        }))
    }

    /// Active RSA public key PEM for `name`.
    pub fn rsa_public_pem(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get_key(name)?.and_then(|record| match &record.material {
            KeyMaterial::RsaKeypair { public_pem, .. } => Some(public_pem.clone()),
            _ => None,
        }))
    }

    /// Active RSA private key PEM for `name`.
    pub fn rsa_private_pem(&self, name: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self.get_key(name)?.and_then(|record| match &record.material {
            KeyMaterial::RsaKeypair { private_pem, .. } => Some(Zeroizing::new(private_pem.clone())),
            _ => None,
        }))
    }

    /// Active salt bytes for `name`.
    pub fn salt(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_key(name)?.and_then(|record| match &record.material {
            KeyMaterial::Salt { salt } => Some(salt.clone()),
            _ => None,
        }))
    }

    /// Any generation stored under `name`, including archived and destroyed ones.
    pub fn get_record(&self, name: &str) -> Option<ManagedKey> {
        self.read_records().get(name).cloned()
    }

    /// Summaries of every loaded record, sorted by name.
    pub fn list_keys(&self) -> Vec<KeySummary> {
        self.read_records().values().map(ManagedKey::summary).collect()
    }

    /// Active keys past the rotation interval.
    pub fn due_for_rotation(&self) -> Vec<KeyName> {
        self.read_records()
            .values()
            .filter(|r| r.active && self.is_due(r))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Archived generation names of `name`, oldest first.
    pub fn generations(&self, name: &str) -> Vec<KeyName> {
        let prefix = format!("{name}_old_");
        let mut names: Vec<(chrono::DateTime<Utc>, KeyName)> = self
            .read_records()
            .values()
            .filter(|r| r.name.starts_with(&prefix))
            .map(|r| (r.created_at, r.name.clone()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, n)| n).collect()
    }
}

impl KeySource for KeyManager {
    fn encryption_key(&self, key_id: &str) -> Result<Option<SymmetricKey>> {
        self.symmetric_key(key_id)
    }

    fn decryption_key(&self, key_id: &str) -> Result<Option<SymmetricKey>> {
        self.refresh_record(key_id)?;
        Ok(self
            .read_records()
            .get(key_id)
            .filter(|r| !r.is_destroyed())
            .and_then(|r| match &r.material {
                KeyMaterial::Symmetric { key } => cipher::key_from_slice(key).ok(),
                _ => None,
            }))
    }
}

fn read_master(path: &std::path::Path) -> Result<SymmetricKey> {
    let bytes = Zeroizing::new(fsutil::read_key_file(path)?);
    if bytes.len() != KEY_SIZE {
        return Err(StoreError::InvalidFormat(format!(
            "master key {} has {} bytes, expected {KEY_SIZE}",
            path.display(),
            bytes.len()
        ))
        .into());
    }
    cipher::key_from_slice(&bytes)
}

pub(super) fn write_master_check(path: &std::path::Path, master: &SymmetricKey) -> Result<()> {
    let blob = aead::seal_blob(master, MASTER_CHECK_AAD, b"")?;
    fsutil::atomic_write(path, &blob, true)
}

/// Key names become file names, so they are restricted to a safe alphabet.
pub(super) fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| -> crate::error::Error {
        KeyError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > 128 {
        return Err(invalid("name is longer than 128 characters"));
    }
    if name.starts_with('.') {
        return Err(invalid("name cannot start with '.'"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(invalid(&format!(
            "invalid character '{ch}'; only A-Z, a-z, 0-9, '_', '-' and '.' are allowed"
        )));
    }
    Ok(())
}
