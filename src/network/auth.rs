use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Header carrying the request signature on peer RPC calls.
pub const SIGNATURE_HEADER: &str = "X-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while checking a request signature
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing X-Signature header")]
    Missing,

    #[error("malformed X-Signature header")]
    Malformed,

    #[error("signature does not match request body")]
    Mismatch,
}

/// HMAC-SHA256 of the exact request body bytes, hex encoded. Requests with
/// no body (signed GETs) sign the empty byte string.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies `signature` against `body`. The comparison runs in constant
/// time, so a forger learns nothing from response timing.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> Result<(), SignatureError> {
    let claimed = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&claimed).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_sign_and_verify_round_trip() {
        let body = br#"{"sender":"alice"}"#;
        let signature = sign(body, SECRET);
        assert!(verify(body, &signature, SECRET).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign(br#"{"price":1}"#, SECRET);
        assert_eq!(
            verify(br#"{"price":9}"#, &signature, SECRET),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = b"payload";
        let signature = sign(body, "other-secret");
        assert_eq!(verify(body, &signature, SECRET), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_non_hex_signature_is_malformed() {
        assert_eq!(
            verify(b"payload", "not hex!", SECRET),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_empty_body_is_signable() {
        let signature = sign(b"", SECRET);
        assert!(verify(b"", &signature, SECRET).is_ok());
        assert_eq!(verify(b"x", &signature, SECRET), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_signature_is_hex_of_sha256_width() {
        let signature = sign(b"payload", SECRET);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
