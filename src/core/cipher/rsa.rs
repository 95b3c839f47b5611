//! RSA-OAEP key wrapping.
//!
//! Keys travel as PKCS#8 PEM (private) and SPKI PEM (public). Private keys
//! may be passphrase-protected with PKCS#8 encryption (PBES2).

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::constants::RSA_MIN_BITS;
use crate::error::{CipherError, KeyError, Result};

/// A generated keypair in PEM form.
pub struct PemKeypair {
    pub private_pem: Zeroizing<String>,
    pub public_pem: String,
}

/// Generate an RSA keypair of `bits` bits.
pub fn generate(bits: usize) -> Result<PemKeypair> {
    debug!(bits, "generating RSA keypair");
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| KeyError::GenerationFailed(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::GenerationFailed(e.to_string()))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::GenerationFailed(e.to_string()))?;

    Ok(PemKeypair {
        private_pem,
        public_pem,
    })
}

/// Parse an SPKI public key and enforce the minimum modulus size.
pub fn parse_public(public_pem: &str) -> Result<RsaPublicKey> {
    let public = RsaPublicKey::from_public_key_pem(public_pem)
        .map_err(|e| CipherError::InvalidInput(format!("invalid RSA public key: {e}")))?;
    let bits = public.size() * 8;
    if bits < RSA_MIN_BITS {
        return Err(CipherError::WeakKey {
            bits,
            minimum: RSA_MIN_BITS,
        }
        .into());
    }
    Ok(public)
}

/// Parse a PKCS#8 private key, decrypting it when a passphrase is given.
pub fn parse_private(private_pem: &str, passphrase: Option<&str>) -> Result<RsaPrivateKey> {
    let parsed = match passphrase {
        Some(pass) => RsaPrivateKey::from_pkcs8_encrypted_pem(private_pem, pass.as_bytes()),
        None => RsaPrivateKey::from_pkcs8_pem(private_pem),
    };
    parsed.map_err(|_| CipherError::KeyUnwrap("unable to load private key".to_string()).into())
}

/// Encrypt `key_bytes` to `public_pem` with RSA-OAEP(SHA-256).
pub fn wrap(key_bytes: &[u8], public_pem: &str) -> Result<Vec<u8>> {
    if key_bytes.is_empty() {
        return Err(CipherError::InvalidInput("nothing to wrap".to_string()).into());
    }
    let public = parse_public(public_pem)?;
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key_bytes)
        .map_err(|e| CipherError::InvalidInput(format!("RSA-OAEP encryption failed: {e}")).into())
}

/// Decrypt bytes produced by [`wrap`].
///
/// Wrong keys and corrupted input both yield `CipherError::KeyUnwrap`.
pub fn unwrap(
    wrapped: &[u8],
    private_pem: &str,
    passphrase: Option<&str>,
) -> Result<Zeroizing<Vec<u8>>> {
    let private = parse_private(private_pem, passphrase)?;
    private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::KeyUnwrap("wrapped key could not be decrypted".to_string()).into())
}

/// Re-encode an unencrypted PKCS#8 private key under `passphrase`.
pub fn protect(private_pem: &str, passphrase: &str) -> Result<Zeroizing<String>> {
    if passphrase.is_empty() {
        return Err(CipherError::EmptyPassword.into());
    }
    let private = parse_private(private_pem, None)?;
    private
        .to_pkcs8_encrypted_pem(&mut OsRng, passphrase.as_bytes(), LineEnding::LF)
        .map_err(|e| CipherError::InvalidInput(format!("failed to encrypt private key: {e}")).into())
}
