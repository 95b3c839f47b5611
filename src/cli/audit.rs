//! Audit log commands.

use crate::cli::{output, AuditAction, Context};
use crate::error::{Result, StoreError};

/// Dispatch an `audit` subcommand.
pub fn execute(ctx: &Context, action: AuditAction) -> Result<()> {
    match action {
        AuditAction::Verify => verify(ctx),
    }
}

fn verify(ctx: &Context) -> Result<()> {
    let report = ctx.audit.verify_log()?;

    output::header("Audit log");
    output::rule();
    output::kv("file:   ", output::path(ctx.audit.log_path()));
    output::kv("entries:", report.total);
    output::kv("valid:  ", report.valid);

    if report.is_clean() {
        output::success("all entries verified");
        return Ok(());
    }

    for line in &report.tampered {
        output::error(&format!("line {line}: HMAC mismatch"));
    }
    for line in &report.malformed {
        output::error(&format!("line {line}: not an audit entry"));
    }
    Err(StoreError::Integrity(format!(
        "{} tampered and {} malformed audit entries",
        report.tampered.len(),
        report.malformed.len()
    ))
    .into())
}
