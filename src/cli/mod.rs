//! Command-line interface.

pub mod audit;
pub mod completions;
pub mod key;
pub mod output;
pub mod seal;
pub mod secret;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::audit::AuditLogger;
use crate::core::config::{self, Config};
use crate::core::keys::KeyManager;
use crate::core::layout::StoreLayout;
use crate::core::types::ActorId;
use crate::core::vault::SecretVault;
use crate::error::Result;

/// Vaultkeeper - local key management and encrypted secret storage.
#[derive(Parser)]
#[command(
    name = "vaultkeeper",
    about = "Local key management, encrypted secret storage and tamper-evident audit logging",
    version
)]
pub struct Cli {
    /// Store root (defaults to $VAULTKEEPER_ROOT or ~/.vaultkeeper)
    #[arg(long, global = true, env = "VAULTKEEPER_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Command {
    /// Manage cryptographic keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Manage application secrets
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// Encrypt a file with a password
    Seal {
        /// File to encrypt
        input: PathBuf,
        /// Where to write the encrypted payload
        output: PathBuf,
        /// Read the password from this environment variable
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// Decrypt a file sealed with a password
    Unseal {
        /// Encrypted payload
        input: PathBuf,
        /// Where to write the plaintext
        output: PathBuf,
        /// Read the password from this environment variable
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Key subcommands.
#[derive(Subcommand)]
pub enum KeyAction {
    /// Generate a new key
    Generate {
        /// Key name (e.g., db, payments_signing)
        name: String,
        /// Kind of key to generate
        #[arg(long, value_enum, default_value_t = KeyKind::Symmetric)]
        kind: KeyKind,
    },

    /// Rotate a key, archiving the current generation
    Rotate {
        /// Key name
        name: String,
    },

    /// Destroy a key's material
    Destroy {
        /// Name of an active key
        name: String,
    },

    /// List all keys
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split the master key into backup shares
    Backup,

    /// Restore the master key from backup shares
    Restore {
        /// Share files
        #[arg(required = true)]
        shares: Vec<PathBuf>,
    },
}

/// Secret subcommands.
#[derive(Subcommand)]
pub enum SecretAction {
    /// Store a secret
    Set {
        /// Secret name (e.g., stripe.api_key)
        name: String,
        /// Secret value
        value: String,
        /// Key derivation context (defaults to secret_<name>)
        #[arg(long)]
        context: Option<String>,
        /// Days until the secret expires
        #[arg(long)]
        ttl_days: Option<u32>,
    },

    /// Print a secret value
    Get {
        /// Secret name
        name: String,
    },

    /// List stored secrets
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a secret
    Rm {
        /// Secret name
        name: String,
    },

    /// Rotate the vault key
    Rotate {
        /// Rotate even if the interval has not elapsed
        #[arg(long)]
        force: bool,
    },

    /// Move credentials out of legacy JSON config files
    Migrate {
        /// Config files (defaults to vault.legacy_configs)
        files: Vec<PathBuf>,
    },
}

/// Audit subcommands.
#[derive(Subcommand)]
pub enum AuditAction {
    /// Verify the HMAC of every audit log entry
    Verify,
}

/// Kinds of key `key generate` can create.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Symmetric,
    Rsa,
    Salt,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Store root, configuration and shared audit logger for one invocation.
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub layout: StoreLayout,
    pub audit: Arc<AuditLogger>,
    pub actor: ActorId,
}

impl Context {
    /// Resolve the store root and load its configuration.
    pub fn open(root: Option<PathBuf>) -> Result<Self> {
        let root = config::resolve_root(root)?;
        let config = Config::load(&root)?;
        let layout = StoreLayout::new(&root, &config);
        let audit = Arc::new(AuditLogger::open(&layout, &config));
        let actor = whoami::username();
        debug!(root = %root.display(), actor = %actor, "opened store");
        Ok(Self {
            root,
            config,
            layout,
            audit,
            actor,
        })
    }

    pub fn keys(&self) -> Result<KeyManager> {
        Ok(KeyManager::open(&self.layout, &self.config, Arc::clone(&self.audit))?
            .with_actor(self.actor.clone()))
    }

    pub fn vault(&self) -> Result<SecretVault> {
        Ok(SecretVault::open(&self.layout, &self.config, Arc::clone(&self.audit))?
            .with_actor(self.actor.clone()))
    }
}

/// Execute a parsed command line.
pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => completions::execute(shell),
        Command::Seal {
            input,
            output,
            password_env,
        } => seal::seal(&input, &output, password_env.as_deref()),
        Command::Unseal {
            input,
            output,
            password_env,
        } => seal::unseal(&input, &output, password_env.as_deref()),
        Command::Key { action } => key::execute(&Context::open(cli.root)?, action),
        Command::Secret { action } => secret::execute(&Context::open(cli.root)?, action),
        Command::Audit { action } => audit::execute(&Context::open(cli.root)?, action),
    }
}
