//! Key derivation.
//!
//! Passwords go through PBKDF2-HMAC-SHA256; high-entropy master keys are
//! split into per-context sub-keys with HKDF-SHA256.

use std::num::NonZeroU32;

use ring::{hkdf, pbkdf2};
use zeroize::Zeroizing;

use super::SymmetricKey;
use crate::core::constants::KEY_SIZE;
use crate::error::{CipherError, Result};

/// HKDF extraction salt; separates vaultkeeper sub-keys from other uses of a key.
const HKDF_SALT: &[u8] = b"vaultkeeper/hkdf/v1";

/// Derive a 256-bit key from `password` with PBKDF2-HMAC-SHA256.
///
/// # Errors
///
/// Returns `CipherError::EmptyPassword` for an empty password and
/// `CipherError::InvalidInput` for a zero iteration count.
pub fn derive_from_password(password: &[u8], salt: &[u8], iterations: u32) -> Result<SymmetricKey> {
    if password.is_empty() {
        return Err(CipherError::EmptyPassword.into());
    }
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| CipherError::InvalidInput("iteration count must be positive".to_string()))?;

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password,
        &mut out[..],
    );
    Ok(out)
}

/// Derive a context-bound sub-key from a master key with HKDF-SHA256.
///
/// Different `context` strings yield independent keys.
pub fn derive_subkey(master: &[u8; KEY_SIZE], context: &str) -> Result<SymmetricKey> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT);
    let prk = salt.extract(master);
    let info = [context.as_bytes()];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| CipherError::InvalidInput("HKDF expansion failed".to_string()))?;

    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    okm.fill(&mut out[..])
        .map_err(|_| CipherError::InvalidInput("HKDF output failed".to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration counts keep unit tests fast; the engine enforces the real count.
    #[test]
    fn test_password_derivation_is_deterministic() {
        let k1 = derive_from_password(b"hunter2", &[1u8; 16], 1000).unwrap();
        let k2 = derive_from_password(b"hunter2", &[1u8; 16], 1000).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_password_derivation_depends_on_salt() {
        let k1 = derive_from_password(b"hunter2", &[1u8; 16], 1000).unwrap();
        let k2 = derive_from_password(b"hunter2", &[2u8; 16], 1000).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(derive_from_password(b"", &[1u8; 16], 1000).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(derive_from_password(b"pw", &[1u8; 16], 0).is_err());
    }

    #[test]
    fn test_subkeys_are_context_bound() {
        let master = [5u8; KEY_SIZE];
        let a = derive_subkey(&master, "secret_db").unwrap();
        let b = derive_subkey(&master, "secret_api").unwrap();
        let a2 = derive_subkey(&master, "secret_db").unwrap();
        assert_ne!(*a, *b);
        assert_eq!(*a, *a2);
    }

    #[test]
    fn test_subkeys_depend_on_master() {
        let a = derive_subkey(&[1u8; KEY_SIZE], "ctx").unwrap();
        let b = derive_subkey(&[2u8; KEY_SIZE], "ctx").unwrap();
        assert_ne!(*a, *b);
    }
}
