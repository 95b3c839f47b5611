//! HMAC-SHA256.

use ring::hmac;

/// Compute HMAC-SHA256 of `data` as lowercase hex.
pub fn sign_hex(key: &[u8], data: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, data).as_ref())
}

/// Verify a hex HMAC in constant time.
///
/// Malformed hex is a mismatch, not an error.
pub fn verify_hex(key: &[u8], data: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, data, &expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let tag = sign_hex(b"key", b"message");
        assert_eq!(tag.len(), 64);
        assert!(verify_hex(b"key", b"message", &tag));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let tag = sign_hex(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_modified_data_rejected() {
        let tag = sign_hex(b"key", b"message");
        assert!(!verify_hex(b"key", b"messagE", &tag));
        assert!(!verify_hex(b"other", b"message", &tag));
    }

    #[test]
    fn test_malformed_hex_rejected() {
        assert!(!verify_hex(b"key", b"message", "not-hex"));
        assert!(!verify_hex(b"key", b"message", ""));
    }
}
