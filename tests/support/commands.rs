//! Command helper methods for Test.

use super::Test;
use assert_cmd::Command;
use std::process::Output;

impl Test {
    /// Create a vaultkeeper command bound to this store.
    ///
    /// Returns a Command configured with:
    /// - VAULTKEEPER_ROOT set to the store root
    /// - HOME set to the temporary home directory
    /// - NO_COLOR set so output can be matched verbatim
    pub fn cmd(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd =
            Command::cargo_bin("vaultkeeper").expect("failed to find vaultkeeper binary");
        cmd.env("VAULTKEEPER_ROOT", self.root());
        cmd.env("HOME", self.home.path());
        // Windows uses USERPROFILE instead of HOME for home directory
        cmd.env("USERPROFILE", self.home.path());
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("VAULTKEEPER_LOG");
        cmd.current_dir(self.home.path());
        cmd
    }

    /// Run `vaultkeeper` with `args`.
    pub fn run(&self, args: &[&str]) -> Output {
        self.cmd()
            .args(args)
            .output()
            .expect("failed to run vaultkeeper")
    }

    /// Shortcut for `vaultkeeper secret set`.
    pub fn set(&self, name: &str, value: &str) -> Output {
        self.run(&["secret", "set", name, value])
    }

    /// Shortcut for `vaultkeeper secret get`.
    pub fn get(&self, name: &str) -> Output {
        self.run(&["secret", "get", name])
    }

    /// Shortcut for `vaultkeeper key generate`.
    pub fn generate(&self, name: &str) -> Output {
        self.run(&["key", "generate", name])
    }
}
