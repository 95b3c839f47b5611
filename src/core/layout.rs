//! On-disk layout of a store root.

use std::path::{Path, PathBuf};

use crate::core::config::Config;

/// Resolved paths of every file in a store root.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    backup_dir: PathBuf,
    audit_log: PathBuf,
    audit_hmac_key: PathBuf,
}

impl StoreLayout {
    /// Layout for `root`, resolving configurable paths against it.
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        let root = root.into();
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        Self {
            backup_dir: resolve(&config.keys.backup_dir),
            audit_log: resolve(&config.audit.log_file),
            audit_hmac_key: resolve(&config.audit.hmac_key_file),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root lock, guarding creation of root-level key files.
    pub fn root_lock(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn master_key(&self) -> PathBuf {
        self.root.join("master.key")
    }

    pub fn master_check(&self) -> PathBuf {
        self.root.join("master.kcv")
    }

    pub fn audit_log(&self) -> &Path {
        &self.audit_log
    }

    pub fn audit_hmac_key(&self) -> &Path {
        &self.audit_hmac_key
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn keys_lock(&self) -> PathBuf {
        self.keys_dir().join(".lock")
    }

    /// Encrypted record of one managed key.
    pub fn key_file(&self, name: &str) -> PathBuf {
        self.keys_dir().join(format!("{name}.key.enc"))
    }

    pub fn rotation_schedule(&self) -> PathBuf {
        self.keys_dir().join("rotation_schedule.json")
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Share file for 1-based share index `i`.
    pub fn share_file(&self, i: u8) -> PathBuf {
        self.backup_dir.join(format!("key_share_{i}.bin"))
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.root.join("vault")
    }

    pub fn vault_lock(&self) -> PathBuf {
        self.vault_dir().join(".lock")
    }

    pub fn vault_key(&self) -> PathBuf {
        self.vault_dir().join("vault.key")
    }

    pub fn vault_key_backup(&self) -> PathBuf {
        self.vault_dir().join("vault.key.bak")
    }

    pub fn secrets_file(&self) -> PathBuf {
        self.vault_dir().join("secrets.enc")
    }

    pub fn secrets_backup(&self) -> PathBuf {
        self.vault_dir().join("secrets.enc.bak")
    }

    pub fn access_log(&self) -> PathBuf {
        self.vault_dir().join("access.log.enc")
    }

    pub fn migration_flag(&self) -> PathBuf {
        self.vault_dir().join(".migrated")
    }
}
