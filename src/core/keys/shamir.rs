//! Threshold secret sharing of the master key.
//!
//! Shamir's scheme over GF(256) with the AES reduction polynomial
//! x^8 + x^4 + x^3 + x + 1 (0x11B). Each key byte gets its own random
//! polynomial of degree `threshold - 1` whose constant term is that byte.
//!
//! A share is `[x, y_0, ..., y_31]`: its x-coordinate followed by the
//! polynomial values for every key byte.

use zeroize::{Zeroize, Zeroizing};

use crate::core::cipher::{self, SymmetricKey};
use crate::core::constants::KEY_SIZE;
use crate::error::{KeyError, Result};

/// Serialized length of one share.
pub const SHARE_LEN: usize = KEY_SIZE + 1;

mod gf256 {
    /// Carry-less multiply with reduction by 0x11B.
    pub const fn mul(mut a: u8, mut b: u8) -> u8 {
        let mut product = 0u8;
        let mut bit = 0;
        while bit < 8 {
            if b & 1 != 0 {
                product ^= a;
            }
            let high = a & 0x80;
            a <<= 1;
            if high != 0 {
                a ^= 0x1B;
            }
            b >>= 1;
            bit += 1;
        }
        product
    }

    /// Multiplicative inverse, a^254. Zero maps to zero.
    pub const fn inv(a: u8) -> u8 {
        if a == 0 {
            return 0;
        }
        // square-and-multiply over the bits of 254 = 0b1111_1110
        let mut result = 1u8;
        let mut base = a;
        let mut exp = 254u8;
        while exp > 0 {
            if exp & 1 != 0 {
                result = mul(result, base);
            }
            base = mul(base, base);
            exp >>= 1;
        }
        result
    }

    /// Horner evaluation; `coeffs[0]` is the constant term.
    pub fn eval(coeffs: &[u8], x: u8) -> u8 {
        coeffs.iter().rev().fold(0u8, |acc, &c| mul(acc, x) ^ c)
    }
}

/// One share of a split key.
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    data: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index())
            .field("data", &"[REDACTED]")
            .finish()
    }
}

impl Share {
    /// Parse a share read from disk.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidShare` for a wrong length or zero index.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARE_LEN {
            return Err(KeyError::InvalidShare(format!(
                "share has {} bytes, expected {SHARE_LEN}",
                bytes.len()
            ))
            .into());
        }
        if bytes[0] == 0 {
            return Err(KeyError::InvalidShare("share index cannot be zero".to_string()).into());
        }
        Ok(Self {
            data: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// 1-based x-coordinate.
    pub fn index(&self) -> u8 {
        self.data[0]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Split `secret` into `total` shares, any `threshold` of which rebuild it.
///
/// # Errors
///
/// Returns `KeyError::InvalidShare` unless `2 <= threshold <= total`.
pub fn split(secret: &[u8; KEY_SIZE], threshold: u8, total: u8) -> Result<Vec<Share>> {
    if threshold < 2 || threshold > total {
        return Err(KeyError::InvalidShare(format!(
            "threshold {threshold} of {total} shares is not a valid scheme"
        ))
        .into());
    }

    let mut shares: Vec<Vec<u8>> = (1..=total)
        .map(|x| {
            let mut data = vec![0u8; SHARE_LEN];
            data[0] = x;
            data
        })
        .collect();

    let mut coeffs = vec![0u8; threshold as usize];
    for (i, &byte) in secret.iter().enumerate() {
        coeffs[0] = byte;
        cipher::fill_random(&mut coeffs[1..])?;
        for share in &mut shares {
            share[i + 1] = gf256::eval(&coeffs, share[0]);
        }
    }
    coeffs.zeroize();

    Ok(shares
        .into_iter()
        .map(|data| Share {
            data: Zeroizing::new(data),
        })
        .collect())
}

/// Rebuild the secret by Lagrange interpolation at x = 0.
///
/// With fewer shares than the split threshold the result is unrelated to the
/// secret; callers enforce the threshold and validate the output.
///
/// # Errors
///
/// Returns `KeyError::InvalidShare` for fewer than two shares or duplicate
/// indices.
pub fn reconstruct(shares: &[Share]) -> Result<SymmetricKey> {
    if shares.len() < 2 {
        return Err(KeyError::InvalidShare("at least two shares are required".to_string()).into());
    }
    let mut xs: Vec<u8> = shares.iter().map(Share::index).collect();
    xs.sort_unstable();
    if xs.windows(2).any(|w| w[0] == w[1]) {
        return Err(KeyError::InvalidShare("duplicate share index".to_string()).into());
    }

    // Lagrange basis at zero: l_i(0) = prod_{j != i} x_j / (x_j - x_i),
    // and subtraction is XOR in GF(2^8).
    let basis: Vec<u8> = shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.index() != si.index())
                .fold(1u8, |acc, sj| {
                    let num = sj.index();
                    let den = sj.index() ^ si.index();
                    gf256::mul(acc, gf256::mul(num, gf256::inv(den)))
                })
        })
        .collect();

    let mut secret = Zeroizing::new([0u8; KEY_SIZE]);
    for (byte, out) in secret.iter_mut().enumerate() {
        *out = shares
            .iter()
            .zip(&basis)
            .fold(0u8, |acc, (share, &l)| acc ^ gf256::mul(share.data[byte + 1], l));
    }
    Ok(secret)
}
