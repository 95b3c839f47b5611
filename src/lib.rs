//! Vaultkeeper - local key management, encrypted secret storage and
//! tamper-evident audit logging.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── cli/              # Command-line interface
//! │   ├── key           # Key lifecycle and backup commands
//! │   ├── secret        # Secret vault commands
//! │   ├── audit         # Audit log verification
//! │   ├── seal          # Password file encryption
//! │   └── completions   # Shell completions
//! └── core/             # Core library components
//!     ├── cipher/       # AES-256-GCM, PBKDF2, HKDF, HMAC, RSA-OAEP
//!     ├── engine        # EncryptionEngine and self-describing payloads
//!     ├── audit/        # HMAC-signed NDJSON audit log with redaction
//!     ├── keys/         # KeyManager, key records, Shamir backup
//!     ├── vault/        # SecretVault, access log, rotation, migration
//!     ├── config        # vaultkeeper.toml management
//!     ├── layout        # Paths inside a store root
//!     ├── lock          # Cross-process store locks
//!     └── fsutil        # Atomic writes and key file permissions
//! ```
//!
//! # Usage
//!
//! Components are constructed explicitly for a store root and share one
//! audit logger:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultkeeper::core::audit::AuditLogger;
//! use vaultkeeper::core::config::Config;
//! use vaultkeeper::core::keys::KeyManager;
//! use vaultkeeper::core::layout::StoreLayout;
//! use vaultkeeper::core::vault::SecretVault;
//!
//! # fn main() -> vaultkeeper::error::Result<()> {
//! let root = std::path::Path::new("/var/lib/app/keys");
//! let config = Config::load(root)?;
//! let layout = StoreLayout::new(root, &config);
//! let audit = Arc::new(AuditLogger::open(&layout, &config));
//!
//! let keys = KeyManager::open(&layout, &config, Arc::clone(&audit))?;
//! keys.generate_symmetric_key("db")?;
//!
//! let vault = SecretVault::open(&layout, &config, audit)?;
//! vault.store_secret("stripe.api_key", "sk_live_...", None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod error;
