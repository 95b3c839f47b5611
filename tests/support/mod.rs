//! Test support utilities for vaultkeeper integration tests.
//!
//! Provides an isolated store root per test plus helpers to open the
//! library components and drive the binary.

#![allow(dead_code)]

pub mod assertions;
pub mod commands;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use vaultkeeper::core::audit::AuditLogger;
use vaultkeeper::core::config::Config;
use vaultkeeper::core::keys::KeyManager;
use vaultkeeper::core::layout::StoreLayout;
use vaultkeeper::core::vault::SecretVault;

/// Test environment with an isolated store root.
///
/// No process-global state is mutated: library components are constructed
/// for `root()` and child processes get the root through their environment,
/// so tests can safely run in parallel.
pub struct Test {
    /// Store root
    pub dir: TempDir,
    /// Temporary home directory for child processes
    pub home: TempDir,
    /// Configuration used when opening components
    pub config: Config,
}

impl Test {
    /// Create a new empty store with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new empty store with `config`.
    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let home = TempDir::new().expect("failed to create temp home");
        Self { dir, home, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(self.root(), &self.config)
    }

    /// A fresh audit logger, as a new process would open it.
    pub fn audit(&self) -> Arc<AuditLogger> {
        Arc::new(AuditLogger::open(&self.layout(), &self.config))
    }

    /// Open the key manager for this store.
    pub fn keys(&self) -> KeyManager {
        KeyManager::open(&self.layout(), &self.config, self.audit()).expect("failed to open keys")
    }

    /// Open the secret vault for this store.
    pub fn vault(&self) -> SecretVault {
        SecretVault::open(&self.layout(), &self.config, self.audit())
            .expect("failed to open vault")
    }

    /// Actions recorded in the audit log, in order.
    pub fn audit_actions(&self) -> Vec<String> {
        self.audit()
            .read_entries()
            .expect("failed to read audit log")
            .into_iter()
            .map(|e| e.record.action)
            .collect()
    }
}
