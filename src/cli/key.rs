//! Key commands.

use crate::cli::{output, Context, KeyAction, KeyKind};
use crate::error::Result;

/// Dispatch a `key` subcommand.
pub fn execute(ctx: &Context, action: KeyAction) -> Result<()> {
    let keys = ctx.keys()?;
    match action {
        KeyAction::Generate { name, kind } => {
            match kind {
                KeyKind::Symmetric => {
                    keys.generate_symmetric_key(&name)?;
                    output::success(&format!("generated AES-256 key {}", output::key(&name)));
                }
                KeyKind::Rsa => {
                    let (_private, public) = keys.generate_key_pair(&name)?;
                    output::success(&format!("generated RSA keypair {}", output::key(&name)));
                    print!("{public}");
                }
                KeyKind::Salt => {
                    let salt = keys.generate_salt(&name)?;
                    output::success(&format!("generated salt {}", output::key(&name)));
                    output::kv("salt:", hex::encode(salt));
                }
            }
            Ok(())
        }

        KeyAction::Rotate { name } => {
            let archived = keys.rotate_key(&name)?;
            output::success(&format!("rotated {}", output::key(&name)));
            output::kv("archived as:", archived);
            Ok(())
        }

        KeyAction::Destroy { name } => {
            keys.destroy_key(&name)?;
            output::success(&format!("destroyed {}", output::key(&name)));
            Ok(())
        }

        KeyAction::List { json } => {
            let summaries = keys.list_keys();
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
                return Ok(());
            }
            if summaries.is_empty() {
                output::dimmed("no keys stored");
                return Ok(());
            }

            output::header(&format!("{} keys", summaries.len()));
            output::rule();
            for s in &summaries {
                println!(
                    "  {:<32} {:<12} {:<9} {}",
                    output::key(&s.name),
                    s.key_type,
                    s.state(),
                    output::faint(&s.created_at.format("%Y-%m-%d").to_string())
                );
            }

            let due = keys.due_for_rotation();
            if !due.is_empty() {
                println!();
                output::warn(&format!("{} key(s) past the rotation interval", due.len()));
                for name in &due {
                    output::list_item(name);
                }
            }
            Ok(())
        }

        KeyAction::Backup => {
            let paths = keys.backup_keys()?;
            output::success(&format!("wrote {} master key shares", paths.len()));
            output::kv("threshold:", ctx.config.keys.shamir_threshold);
            for path in &paths {
                output::list_item(&output::path(path));
            }
            output::hint("store each share in a different place");
            Ok(())
        }

        KeyAction::Restore { shares } => {
            let count = keys.restore_from_backup(&shares)?;
            output::success(&format!(
                "restored master key from {} shares ({} keys loaded)",
                shares.len(),
                count
            ));
            Ok(())
        }
    }
}
