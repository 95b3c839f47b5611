//! Tamper-evident audit log.
//!
//! Each event becomes one NDJSON line `{"record": {...}, "hmac": "<hex>"}`.
//! The HMAC covers the canonical JSON of the redacted record and is keyed
//! with a dedicated audit key, separate from any data-encryption key.
//!
//! [`AuditLogger::log`] never fails from the caller's point of view: write
//! errors go to `tracing::error!` and are dropped.

mod record;
mod redact;

pub use record::{AuditEntry, AuditRecord, AuditReport, AuditStatus, NetworkMeta};
pub use redact::{is_sensitive, redact};

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::cipher::{self, mac, SymmetricKey};
use crate::core::config::Config;
use crate::core::constants::KEY_SIZE;
use crate::core::fsutil;
use crate::core::layout::StoreLayout;
use crate::core::lock::StoreLock;
use crate::error::{Result, StoreError};

/// Action names recorded by this crate.
pub mod action {
    pub const MASTER_KEY_CREATED: &str = "MASTER_KEY_CREATED";
    pub const MASTER_CHECK_FAILED: &str = "MASTER_CHECK_FAILED";
    pub const KEY_GENERATED: &str = "KEY_GENERATED";
    pub const SALT_GENERATED: &str = "SALT_GENERATED";
    pub const KEY_ROTATED: &str = "KEY_ROTATED";
    pub const KEY_DESTROYED: &str = "KEY_DESTROYED";
    pub const KEY_LOAD_ERROR: &str = "KEY_LOAD_ERROR";
    pub const KEYS_BACKED_UP: &str = "KEYS_BACKED_UP";
    pub const KEYS_RESTORED: &str = "KEYS_RESTORED";
    pub const KEYS_RESTORE_FAILED: &str = "KEYS_RESTORE_FAILED";
    pub const SECRET_STORED: &str = "SECRET_STORED";
    pub const SECRET_READ: &str = "SECRET_READ";
    pub const SECRET_EXPIRED: &str = "SECRET_EXPIRED";
    pub const SECRET_REMOVED: &str = "SECRET_REMOVED";
    pub const SUSPICIOUS_ACCESS: &str = "SUSPICIOUS_ACCESS";
    pub const VAULT_KEYS_ROTATED: &str = "VAULT_KEYS_ROTATED";
    pub const VAULT_ROTATION_FAILED: &str = "VAULT_ROTATION_FAILED";
    pub const VAULT_RECOVERED: &str = "VAULT_RECOVERED";
    pub const SECRETS_MIGRATED: &str = "SECRETS_MIGRATED";
}

/// Append-only, HMAC-protected audit log for one store root.
pub struct AuditLogger {
    enabled: bool,
    log_path: PathBuf,
    key_path: PathBuf,
    root_lock: PathBuf,
    lock_timeout: Duration,
    key: OnceLock<SymmetricKey>,
    write: Mutex<()>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.enabled)
            .field("log_path", &self.log_path)
            .field("key_path", &self.key_path)
            .finish()
    }
}

impl AuditLogger {
    /// Logger for the store at `layout`. Nothing touches disk until first use.
    pub fn open(layout: &StoreLayout, config: &Config) -> Self {
        Self {
            enabled: config.audit.enabled,
            log_path: layout.audit_log().to_path_buf(),
            key_path: layout.audit_hmac_key().to_path_buf(),
            root_lock: layout.root_lock(),
            lock_timeout: config.lock.timeout(),
            key: OnceLock::new(),
            write: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Record an event.
    ///
    /// `details` is redacted before it is signed or written.
    pub fn log(
        &self,
        actor_id: &str,
        action: &str,
        resource: &str,
        status: AuditStatus,
        details: Value,
    ) {
        self.log_with_meta(actor_id, action, resource, status, details, &NetworkMeta::default());
    }

    /// Record an event with request metadata.
    pub fn log_with_meta(
        &self,
        actor_id: &str,
        action: &str,
        resource: &str,
        status: AuditStatus,
        details: Value,
        meta: &NetworkMeta,
    ) {
        if !self.enabled {
            return;
        }

        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            status,
            details: redact(&details),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            session_id: meta.session_id.clone(),
        };

        match self.append(record) {
            Ok(()) => info!(actor = actor_id, action, %status, "audit"),
            Err(e) => error!(
                target: "vaultkeeper::audit",
                action,
                error = %e,
                "failed to write audit entry"
            ),
        }
    }

    fn append(&self, record: AuditRecord) -> Result<()> {
        let key = self.hmac_key()?;
        let hmac = mac::sign_hex(&key[..], record.canonical_json()?.as_bytes());
        let line = serde_json::to_string(&AuditEntry { record, hmac })?;

        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        fsutil::append_line(&self.log_path, &line).map_err(StoreError::WriteFailed)?;
        Ok(())
    }

    /// Recompute the HMAC of `entry.record` and compare in constant time.
    pub fn verify_integrity(&self, entry: &AuditEntry) -> bool {
        let key = match self.hmac_key() {
            Ok(key) => key,
            Err(e) => {
                error!(target: "vaultkeeper::audit", error = %e, "audit key unavailable");
                return false;
            }
        };
        match entry.record.canonical_json() {
            Ok(json) => mac::verify_hex(&key[..], json.as_bytes(), &entry.hmac),
            Err(_) => false,
        }
    }

    /// Parse every entry in the log. Malformed lines are skipped with a warning.
    pub fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        for (number, line) in self.lines()? {
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = number, error = %e, "skipping malformed audit line"),
            }
        }
        Ok(entries)
    }

    /// Verify every line of the log.
    pub fn verify_log(&self) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        for (number, line) in self.lines()? {
            report.total += 1;
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) if self.verify_integrity(&entry) => report.valid += 1,
                Ok(_) => report.tampered.push(number),
                Err(_) => report.malformed.push(number),
            }
        }
        debug!(
            total = report.total,
            tampered = report.tampered.len(),
            malformed = report.malformed.len(),
            "verified audit log"
        );
        Ok(report)
    }

    fn lines(&self) -> Result<Vec<(usize, String)>> {
        let file = match fs::File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };
        let mut lines = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(StoreError::ReadFailed)?;
            if !line.trim().is_empty() {
                lines.push((i + 1, line));
            }
        }
        Ok(lines)
    }

    fn hmac_key(&self) -> Result<&SymmetricKey> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let key = self.load_or_create_key()?;
        Ok(self.key.get_or_init(|| key))
    }

    /// The key file is shared store state, so creation happens under the
    /// root lock and a key written by another process wins.
    fn load_or_create_key(&self) -> Result<SymmetricKey> {
        if self.key_path.exists() {
            return read_hmac_key(&self.key_path);
        }

        if let Some(parent) = self.root_lock.parent() {
            fs::create_dir_all(parent).map_err(StoreError::WriteFailed)?;
        }
        let _guard = StoreLock::new(&self.root_lock, self.lock_timeout).acquire()?;
        if self.key_path.exists() {
            return read_hmac_key(&self.key_path);
        }

        let key = cipher::random_key()?;
        fsutil::atomic_write(&self.key_path, &key[..], true)?;
        warn!(path = %self.key_path.display(), "generated new audit HMAC key");
        Ok(key)
    }
}

fn read_hmac_key(path: &Path) -> Result<SymmetricKey> {
    let bytes = zeroize::Zeroizing::new(fsutil::read_key_file(path)?);
    if bytes.len() != KEY_SIZE {
        return Err(StoreError::InvalidFormat(format!(
            "audit HMAC key {} has {} bytes",
            path.display(),
            bytes.len()
        ))
        .into());
    }
    cipher::key_from_slice(&bytes)
}
