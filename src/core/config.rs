//! Configuration file management.
//!
//! Handles reading, writing, and validating `vaultkeeper.toml` inside a
//! store root. Every field has a default, so a missing file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::core::constants;
use crate::error::{ConfigError, Result};

/// Store configuration stored in `vaultkeeper.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Managed key lifecycle settings
    pub keys: KeysConfig,
    /// Secret vault settings
    pub vault: VaultConfig,
    /// Audit log settings
    pub audit: AuditConfig,
    /// Store locking settings
    pub lock: LockConfig,
}

/// `[keys]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Age in days after which `get_key` rotates a key automatically
    pub rotation_interval_days: i64,
    /// Shares required to reconstruct the master key
    pub shamir_threshold: u8,
    /// Shares produced by a backup
    pub shamir_shares: u8,
    /// Backup directory, relative to the store root unless absolute
    pub backup_dir: PathBuf,
    /// Modulus size of generated RSA keypairs
    pub rsa_bits: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            shamir_threshold: 3,
            shamir_shares: 5,
            backup_dir: PathBuf::from("backup"),
            rsa_bits: constants::RSA_BITS,
        }
    }
}

/// `[vault]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Minimum days between two vault key rotations
    pub rotation_interval_days: i64,
    /// Actor recorded for vault operations
    pub actor: String,
    /// Actors whose reads are not flagged as suspicious
    pub privileged_actors: Vec<String>,
    /// Legacy JSON config files scanned by the one-time migration
    pub legacy_configs: Vec<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            rotation_interval_days: 30,
            actor: "system".to_string(),
            privileged_actors: vec!["system".to_string(), "admin".to_string()],
            legacy_configs: Vec::new(),
        }
    }
}

/// `[audit]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When false, `AuditLogger::log` is a no-op
    pub enabled: bool,
    /// Audit log file, relative to the store root unless absolute
    pub log_file: PathBuf,
    /// Audit HMAC key file, relative to the store root unless absolute
    pub hmac_key_file: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: PathBuf::from("audit.log"),
            hmac_key_file: PathBuf::from("audit_hmac.key"),
        }
    }
}

/// `[lock]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Bounded wait for a store lock, in milliseconds
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl LockConfig {
    /// Lock timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Path to the configuration file in a store root
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(constants::CONFIG_FILE)
    }

    /// Load configuration from `<root>/vaultkeeper.toml`, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the TOML is malformed, or
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        debug!(path = %path.display(), "loading config");

        if !path.exists() {
            debug!("no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(ConfigError::ReadFile)?;
        let config: Self = toml::from_str(&contents).map_err(ConfigError::Parse)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `<root>/vaultkeeper.toml`
    pub fn save(&self, root: &Path) -> Result<()> {
        debug!("saving config");
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::create_dir_all(root)?;
        std::fs::write(Self::config_path(root), contents)?;
        Ok(())
    }

    /// Validate the configuration values
    ///
    /// Checks:
    /// - `2 <= shamir_threshold <= shamir_shares`
    /// - `rsa_bits` meets the wrapping minimum
    /// - rotation intervals lie in `0..=constants::MAX_ROTATION_INTERVAL_DAYS`
    /// - the vault actor is not empty
    /// - the lock timeout is positive
    pub fn validate(&self) -> Result<()> {
        debug!("validating config");

        if self.keys.shamir_threshold < 2 {
            return Err(ConfigError::InvalidValue {
                field: "keys.shamir_threshold",
                reason: "must be at least 2".to_string(),
            }
            .into());
        }

        if self.keys.shamir_threshold > self.keys.shamir_shares {
            return Err(ConfigError::InvalidValue {
                field: "keys.shamir_threshold",
                reason: format!(
                    "threshold {} exceeds share count {}",
                    self.keys.shamir_threshold, self.keys.shamir_shares
                ),
            }
            .into());
        }

        if self.keys.rsa_bits < constants::RSA_MIN_BITS {
            return Err(ConfigError::InvalidValue {
                field: "keys.rsa_bits",
                reason: format!("must be at least {}", constants::RSA_MIN_BITS),
            }
            .into());
        }

        if !(0..=constants::MAX_ROTATION_INTERVAL_DAYS).contains(&self.keys.rotation_interval_days) {
            return Err(ConfigError::InvalidValue {
                field: "keys.rotation_interval_days",
                reason: format!("must be between 0 and {}", constants::MAX_ROTATION_INTERVAL_DAYS),
            }
            .into());
        }

        if !(0..=constants::MAX_ROTATION_INTERVAL_DAYS).contains(&self.vault.rotation_interval_days) {
            return Err(ConfigError::InvalidValue {
                field: "vault.rotation_interval_days",
                reason: format!("must be between 0 and {}", constants::MAX_ROTATION_INTERVAL_DAYS),
            }
            .into());
        }

        if self.vault.actor.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "vault.actor",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.lock.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock.timeout_ms",
                reason: "must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Resolve the store root: explicit value, then `$VAULTKEEPER_ROOT`, then `~/.vaultkeeper`.
pub fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    if let Ok(root) = std::env::var(constants::ROOT_ENV) {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    let home = dirs::home_dir()
        .ok_or_else(|| ConfigError::NoRoot("unable to determine home directory".to_string()))?;
    Ok(home.join(constants::DEFAULT_ROOT_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.keys.rotation_interval_days, 90);
        assert_eq!(config.keys.shamir_threshold, 3);
        assert_eq!(config.keys.shamir_shares, 5);
        assert_eq!(config.vault.rotation_interval_days, 30);
        assert!(config.audit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            Config::config_path(tmp.path()),
            "[keys]\nshamir_threshold = 2\nshamir_shares = 3\n",
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.keys.shamir_threshold, 2);
        assert_eq!(config.keys.shamir_shares, 3);
        assert_eq!(config.keys.rotation_interval_days, 90);
        assert_eq!(config.lock.timeout_ms, 5000);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.vault.actor = "billing-service".to_string();
        config.save(tmp.path()).unwrap();

        let loaded = Config::load(tmp.path()).unwrap();
        assert_eq!(loaded.vault.actor, "billing-service");
    }

    #[test]
    fn test_threshold_above_shares_rejected() {
        let mut config = Config::default();
        config.keys.shamir_threshold = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_below_two_rejected() {
        let mut config = Config::default();
        config.keys.shamir_threshold = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weak_rsa_bits_rejected() {
        let mut config = Config::default();
        config.keys.rsa_bits = 2048;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rotation_interval_out_of_range_rejected() {
        let mut config = Config::default();
        config.keys.rotation_interval_days = 1_000_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vault.rotation_interval_days = constants::MAX_ROTATION_INTERVAL_DAYS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vault.rotation_interval_days = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.keys.rotation_interval_days = constants::MAX_ROTATION_INTERVAL_DAYS;
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let mut config = Config::default();
        config.lock.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(Config::config_path(tmp.path()), "[keys\nbroken").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn test_explicit_root_wins() {
        let root = resolve_root(Some(PathBuf::from("/tmp/explicit"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/explicit"));
    }
}
