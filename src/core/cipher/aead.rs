//! AES-256-GCM seal/open.
//!
//! Every call to [`seal`] draws a fresh random 96-bit nonce from the system
//! CSPRNG. Nonce reuse under one key would be catastrophic for GCM.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use tracing::trace;

use super::random_bytes;
use crate::core::constants::{BLOB_VERSION, KEY_SIZE, NONCE_SIZE};
use crate::error::{CipherError, Result};

/// GCM authentication tag length.
pub const TAG_SIZE: usize = 16;

fn less_safe_key(key: &[u8; KEY_SIZE]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CipherError::InvalidInput("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext`, authenticating `aad` alongside it.
///
/// Returns `(ciphertext_with_tag, nonce)`.
pub fn seal(
    key: &[u8; KEY_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let key = less_safe_key(key)?;
    let nonce_bytes = random_bytes::<NONCE_SIZE>()?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| CipherError::InvalidInput("AES-256-GCM encryption failed".to_string()))?;

    trace!(plaintext_len = plaintext.len(), "sealed");
    Ok((in_out, nonce_bytes))
}

/// Decrypt and authenticate.
///
/// Any mismatch (wrong key, wrong aad, flipped bit) is reported as the same
/// opaque `CipherError::DecryptionFailed`.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let key = less_safe_key(key)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(Nonce::assume_unique_for_key(*nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CipherError::DecryptionFailed)?;
    Ok(plaintext.to_vec())
}

/// Seal into a single blob: `version || nonce || ciphertext_with_tag`.
pub fn seal_blob(key: &[u8; KEY_SIZE], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let (ciphertext, nonce) = seal(key, aad, plaintext)?;
    let mut blob = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    blob.push(BLOB_VERSION);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a blob produced by [`seal_blob`].
///
/// Truncated or unversioned input fails with `UnsupportedFormat` before any
/// decryption is attempted.
pub fn open_blob(key: &[u8; KEY_SIZE], aad: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < 1 + NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::UnsupportedFormat("sealed blob too short".to_string()).into());
    }
    if blob[0] != BLOB_VERSION {
        return Err(CipherError::UnsupportedFormat(format!(
            "unknown blob version {:#04x}",
            blob[0]
        ))
        .into());
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&blob[1..1 + NONCE_SIZE]);
    open(key, &nonce, aad, &blob[1 + NONCE_SIZE..])
}
