//! Encrypted per-secret access log.
//!
//! Each line of `access.log.enc` is the hex encoding of one sealed
//! [`AccessRecord`]. Lines are sealed independently, so appending never
//! rewrites earlier entries.

use std::fs;
use std::io::{BufRead, BufReader};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{trace, warn};
use zeroize::Zeroizing;

use super::{integrity, SecretVault};
use crate::core::audit::{action, AuditStatus};
use crate::core::cipher::aead;
use crate::core::fsutil;
use crate::error::{Result, StoreError};

/// Derivation context of the access log key.
pub(super) const ACCESS_CONTEXT: &str = "access_log";

/// Associated data of every access log line.
pub(super) const ACCESS_AAD: &[u8] = b"vaultkeeper:access-log";

/// Access action for a read.
pub const READ: &str = "read";

/// Access action for a write.
pub const STORE: &str = "store";

/// One access log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub secret_name: String,
    pub accessor: String,
    pub action: String,
    pub suspicious: bool,
}

impl SecretVault {
    /// Append an access entry for `name`.
    ///
    /// A `read` by an accessor outside `vault.privileged_actors` is flagged
    /// suspicious and raises a warning audit event.
    pub fn audit_access(&self, name: &str, accessor: &str, action: &str) -> Result<AccessRecord> {
        let _guard = self.lock()?;
        self.append_access(name, accessor, action)
    }

    /// Append without taking the vault lock. Caller holds it.
    pub(super) fn append_access(
        &self,
        name: &str,
        accessor: &str,
        access: &str,
    ) -> Result<AccessRecord> {
        let suspicious =
            access == READ && !self.config.privileged_actors.iter().any(|a| a == accessor);
        let record = AccessRecord {
            timestamp: Utc::now(),
            secret_name: name.to_string(),
            accessor: accessor.to_string(),
            action: access.to_string(),
            suspicious,
        };

        let line = seal_line(&self.derived_key(ACCESS_CONTEXT)?, &record)?;
        fsutil::append_line(&self.layout.access_log(), &line).map_err(StoreError::WriteFailed)?;
        trace!(secret = %name, accessor = %accessor, action = %access, "recorded access");

        if suspicious {
            warn!(secret = %name, accessor = %accessor, "suspicious secret access");
            self.audit.log(
                accessor,
                action::SUSPICIOUS_ACCESS,
                name,
                AuditStatus::Warning,
                json!({ "access": access }),
            );
        }
        Ok(record)
    }

    /// Decrypt every access log entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Integrity` if any line fails to authenticate.
    pub fn read_access_log(&self) -> Result<Vec<AccessRecord>> {
        let _guard = self.lock()?;
        let key = self.derived_key(ACCESS_CONTEXT)?;
        read_lines(&self.layout.access_log())?
            .iter()
            .map(|line| open_line(&key, line))
            .collect()
    }
}

pub(super) fn read_lines(path: &std::path::Path) -> Result<Vec<String>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::ReadFailed(e).into()),
    };
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(StoreError::ReadFailed)?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

pub(super) fn seal_line(
    key: &crate::core::cipher::SymmetricKey,
    record: &AccessRecord,
) -> Result<String> {
    let json = Zeroizing::new(serde_json::to_vec(record)?);
    Ok(hex::encode(aead::seal_blob(key, ACCESS_AAD, &json)?))
}

pub(super) fn open_line(key: &crate::core::cipher::SymmetricKey, line: &str) -> Result<AccessRecord> {
    let blob = hex::decode(line.trim())
        .map_err(|e| StoreError::Integrity(format!("access log line is not hex: {e}")))?;
    let json = Zeroizing::new(aead::open_blob(key, ACCESS_AAD, &blob).map_err(integrity)?);
    serde_json::from_slice(&json)
        .map_err(|e| StoreError::Integrity(format!("access log entry is not valid: {e}")).into())
}
