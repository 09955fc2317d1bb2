use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Header the provider puts its body signature in.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature does not match body")]
    Mismatch,
}

/// Hex HMAC-SHA512 of `body`. Used by tests and local tooling to forge valid
/// webhook deliveries.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha512::new_from_slice(secret) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a webhook signature against the raw request body. The comparison
/// runs in constant time through `Mac::verify_slice`.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha512::new_from_slice(secret).map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"sk_test_webhook_secret";

    #[test]
    fn test_valid_signature_passes() {
        let body = br#"{"event":"charge.success","data":{"reference":"BUS-1"}}"#;
        let sig = sign(SECRET, body);
        assert_eq!(sig.len(), 128);
        assert_eq!(verify_signature(SECRET, body, Some(&sig)), Ok(()));
    }

    #[test]
    fn test_tampered_body_fails() {
        let body = br#"{"event":"charge.success","data":{"amount":100}}"#;
        let sig = sign(SECRET, body);
        let tampered = br#"{"event":"charge.success","data":{"amount":1}}"#;
        assert_eq!(verify_signature(SECRET, tampered, Some(&sig)), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_missing_or_garbage_signature_fails() {
        let body = b"{}";
        assert_eq!(verify_signature(SECRET, body, None), Err(SignatureError::Missing));
        assert_eq!(verify_signature(SECRET, body, Some("  ")), Err(SignatureError::Missing));
        assert_eq!(verify_signature(SECRET, body, Some("not-hex")), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(b"other", body, Some(&sign(SECRET, body))), Err(SignatureError::Mismatch));
    }
}
