//! Secret commands.

use std::path::PathBuf;

use crate::cli::{output, Context, SecretAction};
use crate::error::{Result, StoreError};

/// Dispatch a `secret` subcommand.
pub fn execute(ctx: &Context, action: SecretAction) -> Result<()> {
    let vault = ctx.vault()?;
    match action {
        SecretAction::Set {
            name,
            value,
            context,
            ttl_days,
        } => {
            vault.store_secret(&name, &value, context.as_deref(), ttl_days)?;
            output::success(&format!("stored {}", output::key(&name)));
            Ok(())
        }

        SecretAction::Get { name } => match vault.get_secret(&name, None)? {
            Some(value) => {
                println!("{}", value.as_str());
                Ok(())
            }
            None => Err(StoreError::SecretNotFound(name).into()),
        },

        SecretAction::List { json } => {
            let secrets = vault.list_secrets()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&secrets)?);
                return Ok(());
            }
            if secrets.is_empty() {
                output::dimmed("no secrets stored");
                return Ok(());
            }

            output::header(&format!("{} secrets", secrets.len()));
            output::rule();
            for s in &secrets {
                let state = if s.expired { "expired" } else { "" };
                println!(
                    "  {:<40} {:>6} reads  {}",
                    output::key(&s.name),
                    s.access_count,
                    output::faint(state)
                );
            }

            let health = vault.health()?;
            if health.rotation_due {
                println!();
                output::warn(&format!(
                    "vault key last rotated {} days ago",
                    health.days_since_rotation
                ));
                output::hint("run: vaultkeeper secret rotate");
            }
            Ok(())
        }

        SecretAction::Rm { name } => {
            if vault.remove_secret(&name)? {
                output::success(&format!("removed {}", output::key(&name)));
            } else {
                output::warn(&format!("{} not found", output::key(&name)));
            }
            Ok(())
        }

        SecretAction::Rotate { force } => {
            if force {
                vault.force_rotate_keys()?;
                output::success("rotated vault key");
            } else if vault.rotate_keys()? {
                output::success("rotated vault key");
            } else {
                output::dimmed("rotation not due (use --force to rotate anyway)");
            }
            Ok(())
        }

        SecretAction::Migrate { files } => {
            let files: Vec<PathBuf> = if files.is_empty() {
                ctx.config.vault.legacy_configs.clone()
            } else {
                files
            };
            if files.is_empty() {
                output::dimmed("no legacy config files given");
                return Ok(());
            }

            let report = vault.migrate_legacy_configs(&files)?;
            if report.is_empty() {
                output::dimmed("nothing to migrate");
                return Ok(());
            }
            output::success(&format!("migrated {} secrets", report.migrated.len()));
            for name in &report.migrated {
                output::list_item(&output::key(name));
            }
            for name in &report.skipped {
                output::warn(&format!("{} already in vault, left in place", output::key(name)));
            }
            Ok(())
        }
    }
}
