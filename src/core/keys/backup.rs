//! Master key backup and restore via threshold shares.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{error, info};
use zeroize::Zeroizing;

use super::shamir::{self, Share};
use super::{write_master_check, KeyManager};
use crate::core::audit::{action, AuditStatus};
use crate::core::cipher::{aead, SymmetricKey};
use crate::core::constants::MASTER_CHECK_AAD;
use crate::core::fsutil;
use crate::error::{KeyError, Result, StoreError};

impl KeyManager {
    /// Split the master key into shares and write one file per share.
    ///
    /// Any `shamir_threshold` of the `shamir_shares` files reconstruct the key.
    ///
    /// # Returns
    ///
    /// Paths of the written share files.
    pub fn backup_keys(&self) -> Result<Vec<PathBuf>> {
        self.ensure_master_matches()?;
        let (threshold, total) = (self.config.shamir_threshold, self.config.shamir_shares);

        let paths = {
            let _guard = self.lock(self.layout.keys_lock())?;
            let shares = shamir::split(&self.master_key(), threshold, total)?;
            fs::create_dir_all(self.layout.backup_dir()).map_err(StoreError::WriteFailed)?;

            let mut paths = Vec::with_capacity(shares.len());
            for share in &shares {
                let path = self.layout.share_file(share.index());
                fsutil::atomic_write(&path, share.as_bytes(), true)?;
                paths.push(path);
            }
            paths
        };

        info!(shares = paths.len(), threshold, "backed up master key");
        self.audit.log(
            &self.actor,
            action::KEYS_BACKED_UP,
            "master_key",
            AuditStatus::Success,
            json!({ "shares_count": paths.len(), "threshold": threshold }),
        );
        Ok(paths)
    }

    /// Rebuild the master key from share files and reload every record.
    ///
    /// The candidate key is validated before anything is written: it must
    /// open the store's key check value and decrypt every record file. The
    /// live master key is only replaced after both checks pass.
    ///
    /// # Returns
    ///
    /// Number of key records loaded under the restored key.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Threshold` with fewer than `shamir_threshold`
    /// paths, and `StoreError::Integrity` when the reconstructed key does not
    /// match the store.
    pub fn restore_from_backup<P: AsRef<Path>>(&self, share_paths: &[P]) -> Result<usize> {
        match self.try_restore(share_paths) {
            Ok(count) => {
                info!(keys = count, "restored master key from backup");
                self.audit.log(
                    &self.actor,
                    action::KEYS_RESTORED,
                    "master_key",
                    AuditStatus::Success,
                    json!({ "shares_used": share_paths.len(), "keys_loaded": count }),
                );
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "master key restore failed");
                self.audit.log(
                    &self.actor,
                    action::KEYS_RESTORE_FAILED,
                    "master_key",
                    AuditStatus::Failure,
                    json!({ "shares_used": share_paths.len(), "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    fn try_restore<P: AsRef<Path>>(&self, share_paths: &[P]) -> Result<usize> {
        let required = self.config.shamir_threshold;
        if share_paths.len() < required as usize {
            return Err(KeyError::Threshold {
                required,
                provided: share_paths.len(),
            }
            .into());
        }

        let mut shares = Vec::with_capacity(share_paths.len());
        for path in share_paths {
            let bytes = Zeroizing::new(fs::read(path.as_ref()).map_err(StoreError::ReadFailed)?);
            shares.push(Share::from_bytes(&bytes)?);
        }
        let candidate = shamir::reconstruct(&shares)?;

        let _keys_guard = self.lock(self.layout.keys_lock())?;
        self.validate_candidate(&candidate)?;

        {
            let _root_guard = self.lock(self.layout.root_lock())?;
            fsutil::atomic_write(&self.layout.master_key(), &candidate[..], true)?;
            write_master_check(&self.layout.master_check(), &candidate)?;
        }

        *self.master.write().unwrap_or_else(|e| e.into_inner()) = candidate;
        *self.mismatch.write().unwrap_or_else(|e| e.into_inner()) = false;
        self.reload()
    }

    fn validate_candidate(&self, candidate: &SymmetricKey) -> Result<()> {
        let kcv = self.layout.master_check();
        if kcv.exists() {
            let blob = fs::read(&kcv).map_err(StoreError::ReadFailed)?;
            aead::open_blob(candidate, MASTER_CHECK_AAD, &blob).map_err(|_| {
                StoreError::Integrity(
                    "reconstructed key does not match the master key check value".to_string(),
                )
            })?;
        }

        for name in self.record_names()? {
            let blob = fs::read(self.layout.key_file(&name)).map_err(StoreError::ReadFailed)?;
            aead::open_blob(candidate, name.as_bytes(), &blob).map_err(|_| {
                StoreError::Integrity(format!(
                    "reconstructed key cannot decrypt key record '{name}'"
                ))
            })?;
        }
        Ok(())
    }
}
