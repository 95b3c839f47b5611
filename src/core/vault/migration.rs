//! One-time migration of plaintext credentials out of legacy JSON configs.
//!
//! Every string field whose key looks sensitive is stored in the vault as
//! `<file stem>.<dotted path>` and replaced in place with the migration
//! marker. Fields already holding the marker are left alone, so running the
//! migration twice changes nothing.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::SecretVault;
use crate::core::audit::{action, is_sensitive, AuditStatus};
use crate::core::constants::MIGRATED_MARKER;
use crate::core::fsutil;
use crate::core::types::SecretName;
use crate::error::{Result, StoreError};

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Secrets moved into the vault.
    pub migrated: Vec<SecretName>,
    /// Sensitive fields left in place because the vault already holds the name.
    pub skipped: Vec<SecretName>,
    /// Config files rewritten.
    pub files: Vec<PathBuf>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.migrated.is_empty() && self.skipped.is_empty()
    }
}

impl SecretVault {
    /// Move sensitive fields of each JSON file in `paths` into the vault.
    ///
    /// Relative paths resolve against the store root. Missing files are
    /// ignored; a file that is not valid JSON is an error.
    pub fn migrate_legacy_configs<P: AsRef<Path>>(&self, paths: &[P]) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        for path in paths {
            let path = self.layout.root().join(path.as_ref());
            self.migrate_file(&path, &mut report)?;
        }

        if !report.is_empty() {
            info!(
                migrated = report.migrated.len(),
                skipped = report.skipped.len(),
                "migrated legacy secrets"
            );
            self.audit.log(
                &self.actor,
                action::SECRETS_MIGRATED,
                "vault",
                AuditStatus::Success,
                json!({
                    "migrated": report.migrated,
                    "skipped": report.skipped,
                    "files": report.files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                }),
            );
        }
        Ok(report)
    }

    /// Run the configured migration once per store, guarded by the flag file.
    pub(super) fn auto_migrate(&self) -> Result<()> {
        if self.config.legacy_configs.is_empty() {
            return Ok(());
        }
        let flag = self.layout.migration_flag();
        if flag.exists() {
            debug!("legacy migration already done");
            return Ok(());
        }

        let report = self.migrate_legacy_configs(&self.config.legacy_configs)?;
        let marker = json!({
            "migrated_at": Utc::now().to_rfc3339(),
            "secrets": report.migrated.len(),
        });
        fsutil::atomic_write(&flag, marker.to_string().as_bytes(), false)?;
        Ok(())
    }

    fn migrate_file(&self, path: &Path, report: &mut MigrationReport) -> Result<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "legacy config not found");
                return Ok(());
            }
            Err(e) => return Err(StoreError::ReadFailed(e).into()),
        };
        let mut doc: Value = serde_json::from_str(&text).map_err(|e| {
            StoreError::InvalidFormat(format!("{} is not valid JSON: {e}", path.display()))
        })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());

        let mut changed = false;
        walk(&mut doc, &stem, &mut |name, field| {
            let Value::String(value) = field else {
                return Ok(());
            };
            if value.as_str() == MIGRATED_MARKER || value.is_empty() {
                return Ok(());
            }
            if self.contains(name)? {
                warn!(secret = %name, "secret already in vault, leaving field in place");
                report.skipped.push(name.to_string());
                return Ok(());
            }
            self.store_secret(name, value, None, None)?;
            *field = Value::String(MIGRATED_MARKER.to_string());
            report.migrated.push(name.to_string());
            changed = true;
            Ok(())
        })?;

        if changed {
            let mut out = serde_json::to_vec_pretty(&doc)?;
            out.push(b'\n');
            fsutil::atomic_write(path, &out, false)?;
            report.files.push(path.to_path_buf());
        }
        Ok(())
    }
}

/// Call `visit` for every leaf under a sensitive key.
///
/// Objects and arrays under sensitive keys are descended into rather than
/// visited.
fn walk(
    value: &mut Value,
    prefix: &str,
    visit: &mut dyn FnMut(&str, &mut Value) -> Result<()>,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let name = format!("{prefix}.{}", sanitize(key));
                if is_sensitive(key) && !(child.is_object() || child.is_array()) {
                    visit(&name, child)?;
                } else {
                    walk(child, &name, visit)?;
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                walk(child, &format!("{prefix}.{i}"), visit)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .collect()
}
