//! Store, read, list and remove secrets.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::access::{READ, STORE};
use super::record::{SecretInfo, SecretRecord};
use super::{integrity, SecretVault};
use crate::core::audit::{action, AuditStatus};
use crate::core::cipher::aead;
use crate::error::{Result, StoreError};

const MAX_NAME_LEN: usize = 256;

impl SecretVault {
    /// Encrypt and store `value` under `name`, replacing any previous value.
    ///
    /// The value key is derived from the vault key and `context`, which
    /// defaults to `secret_<name>`. With `ttl_days`, reads return the caller's
    /// default once that many days have passed.
    pub fn store_secret(
        &self,
        name: &str,
        value: &str,
        context: Option<&str>,
        ttl_days: Option<u32>,
    ) -> Result<()> {
        validate_secret_name(name)?;
        let context = context
            .map(str::to_string)
            .unwrap_or_else(|| default_context(name));

        let _guard = self.lock()?;
        let mut store = self.load_store()?;
        let key = self.derived_key(&context)?;
        let record = SecretRecord {
            value: aead::seal_blob(&key, name.as_bytes(), value.as_bytes())?,
            context: context.clone(),
            stored_at: Utc::now(),
            ttl_days,
            access_count: 0,
            last_accessed: None,
            rotated_at: None,
        };
        let replaced = store.secrets.insert(name.to_string(), record).is_some();

        self.write_backup()?;
        self.save_store(&store)?;
        self.append_access(name, &self.actor, STORE)?;

        info!(secret = %name, replaced, "stored secret");
        self.audit.log(
            &self.actor,
            action::SECRET_STORED,
            name,
            AuditStatus::Success,
            json!({ "context": context, "ttl_days": ttl_days, "replaced": replaced }),
        );
        Ok(())
    }

    /// Decrypt the secret `name`.
    ///
    /// Returns `default` when the secret is missing or its TTL has elapsed.
    /// A successful read bumps the access counter and last-accessed time.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Integrity` when the value fails to authenticate.
    pub fn get_secret(
        &self,
        name: &str,
        default: Option<&str>,
    ) -> Result<Option<Zeroizing<String>>> {
        let fallback = || default.map(|d| Zeroizing::new(d.to_string()));

        let _guard = self.lock()?;
        let mut store = self.load_store()?;
        let now = Utc::now();

        let Some(record) = store.secrets.get_mut(name) else {
            debug!(secret = %name, "secret not found");
            return Ok(fallback());
        };

        if record.is_expired(now) {
            info!(secret = %name, "secret expired");
            self.audit.log(
                &self.actor,
                action::SECRET_EXPIRED,
                name,
                AuditStatus::Warning,
                json!({ "stored_at": record.stored_at.to_rfc3339(), "ttl_days": record.ttl_days }),
            );
            return Ok(fallback());
        }

        let key = self.derived_key(&record.context)?;
        let plaintext = Zeroizing::new(
            aead::open_blob(&key, name.as_bytes(), &record.value).map_err(integrity)?,
        );
        let value = String::from_utf8(plaintext.to_vec())
            .map_err(|_| StoreError::Integrity(format!("secret '{name}' is not valid UTF-8")))?;

        record.access_count += 1;
        record.last_accessed = Some(now);
        let count = record.access_count;

        self.save_store(&store)?;
        self.append_access(name, &self.actor, READ)?;

        self.audit.log(
            &self.actor,
            action::SECRET_READ,
            name,
            AuditStatus::Success,
            json!({ "access_count": count }),
        );
        Ok(Some(Zeroizing::new(value)))
    }

    /// Delete `name`. Returns false if it did not exist.
    pub fn remove_secret(&self, name: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let mut store = self.load_store()?;
        if store.secrets.remove(name).is_none() {
            return Ok(false);
        }

        self.write_backup()?;
        self.save_store(&store)?;

        info!(secret = %name, "removed secret");
        self.audit.log(
            &self.actor,
            action::SECRET_REMOVED,
            name,
            AuditStatus::Success,
            json!({}),
        );
        Ok(true)
    }

    /// Metadata of every secret, sorted by name. Values are not decrypted.
    pub fn list_secrets(&self) -> Result<Vec<SecretInfo>> {
        let _guard = self.lock()?;
        let store = self.load_store()?;
        let now = Utc::now();
        Ok(store
            .secrets
            .iter()
            .map(|(name, r)| SecretInfo {
                name: name.clone(),
                context: r.context.clone(),
                stored_at: r.stored_at,
                ttl_days: r.ttl_days,
                access_count: r.access_count,
                last_accessed: r.last_accessed,
                expired: r.is_expired(now),
            })
            .collect())
    }

    /// True if `name` is stored, expired or not.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let _guard = self.lock()?;
        Ok(self.load_store()?.secrets.contains_key(name))
    }
}

pub(super) fn default_context(name: &str) -> String {
    format!("secret_{name}")
}

/// Secret names are printable, without whitespace or path separators.
pub(super) fn validate_secret_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty".to_string())
    } else if name.len() > MAX_NAME_LEN {
        Some(format!("name is longer than {MAX_NAME_LEN} characters"))
    } else if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\'))
    {
        Some(format!("name contains invalid character {c:?}"))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidSecretName {
            name: name.to_string(),
            reason,
        }
        .into()),
        None => Ok(()),
    }
}
