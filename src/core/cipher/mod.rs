//! Cryptographic primitives.
//!
//! Thin, stateless wrappers over `ring` and `rsa`. Higher layers
//! ([`crate::core::engine`], [`crate::core::keys`], [`crate::core::vault`])
//! build their formats on top of these.
//!
//! ## Primitives
//!
//! - **aead**: AES-256-GCM seal/open with a fresh random 96-bit nonce per call.
//! - **kdf**: PBKDF2-HMAC-SHA256 for passwords, HKDF-SHA256 for sub-keys.
//! - **mac**: HMAC-SHA256 with constant-time verification.
//! - **rsa**: RSA-OAEP(SHA-256) key wrapping and keypair generation.

use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::core::constants::KEY_SIZE;
use crate::error::{CipherError, Result};

pub mod aead;
pub mod kdf;
pub mod mac;
pub mod rsa;

/// A 256-bit symmetric key, wiped on drop.
pub type SymmetricKey = Zeroizing<[u8; KEY_SIZE]>;

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CipherError::Rng.into())
}

/// Fill an array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random 256-bit key.
pub fn random_key() -> Result<SymmetricKey> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    fill_random(&mut key[..])?;
    Ok(key)
}

/// Copy raw bytes into a [`SymmetricKey`], checking the length.
pub fn key_from_slice(bytes: &[u8]) -> Result<SymmetricKey> {
    if bytes.len() != KEY_SIZE {
        return Err(CipherError::InvalidInput(format!(
            "expected {KEY_SIZE}-byte key, got {} bytes",
            bytes.len()
        ))
        .into());
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_keys_differ() {
        let a = random_key().unwrap();
        let b = random_key().unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_key_from_slice_length_checked() {
        assert!(key_from_slice(&[0u8; 16]).is_err());
        let key = key_from_slice(&[9u8; 32]).unwrap();
        assert_eq!(key[0], 9);
    }
}
