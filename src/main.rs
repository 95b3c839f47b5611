//! Vaultkeeper - local key management and encrypted secret storage.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vaultkeeper::cli::output;
use vaultkeeper::cli::{execute, Cli};
use vaultkeeper::core::constants::LOG_ENV;
use vaultkeeper::error::{CipherError, ConfigError, Error, KeyError, StoreError};

fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber with env-filter support
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("vaultkeeper=debug")
        } else {
            EnvFilter::new("vaultkeeper=warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    if let Err(e) = execute(cli) {
        // Format error with suggestion if available
        let suggestion = match &e {
            Error::Store(StoreError::Integrity(_)) => {
                Some("the store may be tampered with; run: vaultkeeper audit verify")
            }
            Error::Store(StoreError::LockTimeout { .. }) => {
                Some("another vaultkeeper process holds the lock; remove a stale .lock file if none is running")
            }
            Error::Store(StoreError::SecretNotFound(_)) => Some("run: vaultkeeper secret list"),
            Error::Key(KeyError::NotFound(_)) => Some("run: vaultkeeper key list"),
            Error::Key(KeyError::Threshold { .. }) => {
                Some("pass at least as many share files as keys.shamir_threshold")
            }
            Error::Cipher(CipherError::DecryptionFailed) => Some("check the password or key"),
            Error::Config(ConfigError::InvalidValue { .. }) => Some("check vaultkeeper.toml"),
            _ => None,
        };

        output::error(&e.to_string());
        if let Some(hint) = suggestion {
            output::hint(hint);
        }
        std::process::exit(1);
    }
}
