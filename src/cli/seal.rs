//! Seal and unseal commands: password-based file encryption.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::Path;

use dialoguer::Password;
use zeroize::Zeroizing;

use crate::cli::output;
use crate::core::engine::{EncryptionEngine, PasswordPayload};
use crate::core::fsutil;
use crate::error::{CipherError, ConfigError, Result, StoreError};

/// Encrypt `input` into a JSON password payload at `output`.
pub fn seal(input: &Path, out: &Path, password_env: Option<&str>) -> Result<()> {
    let plaintext = Zeroizing::new(fs::read(input).map_err(StoreError::ReadFailed)?);
    let password = password(password_env, true)?;

    let payload = EncryptionEngine::new().encrypt_with_password(&plaintext, &password, None)?;
    let mut json = serde_json::to_vec_pretty(&payload)?;
    json.push(b'\n');
    fsutil::atomic_write(out, &json, true)?;

    output::success(&format!("sealed {} -> {}", output::path(input), output::path(out)));
    Ok(())
}

/// Decrypt the payload at `input` into `output`.
pub fn unseal(input: &Path, out: &Path, password_env: Option<&str>) -> Result<()> {
    let text = fs::read_to_string(input).map_err(StoreError::ReadFailed)?;
    let payload: PasswordPayload = serde_json::from_str(&text)
        .map_err(|e| CipherError::UnsupportedFormat(format!("not a sealed payload: {e}")))?;
    let password = password(password_env, false)?;

    let plaintext = EncryptionEngine::new().decrypt_with_password(&payload, &password)?;
    fsutil::atomic_write(out, &plaintext, true)?;

    output::success(&format!("unsealed {} -> {}", output::path(input), output::path(out)));
    Ok(())
}

/// Password from `env_var`, or an interactive prompt on a terminal.
fn password(env_var: Option<&str>, confirm: bool) -> Result<Zeroizing<String>> {
    if let Some(var) = env_var {
        let value = std::env::var(var).map_err(|_| ConfigError::InvalidValue {
            field: "password_env",
            reason: format!("environment variable {var} is not set"),
        })?;
        return Ok(Zeroizing::new(value));
    }

    if !io::stdin().is_terminal() {
        output::hint("pass --password-env VAR in non-interactive mode");
        return Err(CipherError::EmptyPassword.into());
    }

    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "passwords do not match");
    }
    Ok(Zeroizing::new(prompt.interact()?))
}
