//! # Webhook Signing
//!
//! Every delivery is signed with HMAC-SHA256 over the exact request body,
//! keyed by the subscription's secret. The header value is
//! `sha256=<hex digest>`. Verification is constant-time via the `Mac`
//! verification API — string comparison on signatures leaks timing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature header prefix.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signs a payload: `sha256=<hex hmac-sha256>`.
pub fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a signature in constant time.
pub fn verify(payload: &str, signature: &str, secret: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&digest).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let payload = r#"{"id":"evt_1","type":"payment.completed"}"#;
        let signature = sign(payload, "whsec_test");
        assert!(signature.starts_with("sha256="));
        assert!(verify(payload, &signature, "whsec_test"));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = "body";
        let signature = sign(payload, "secret_a");
        assert!(!verify(payload, &signature, "secret_b"));
    }

    #[test]
    fn tampered_payload_fails() {
        let signature = sign("original", "secret");
        assert!(!verify("tampered", &signature, "secret"));
    }

    #[test]
    fn malformed_signatures_fail_cleanly() {
        assert!(!verify("body", "", "secret"));
        assert!(!verify("body", "md5=abc", "secret"));
        assert!(!verify("body", "sha256=not-hex", "secret"));
        assert!(!verify("body", "sha256=abcd", "secret"));
    }

    #[test]
    fn signing_is_deterministic() {
        assert_eq!(sign("x", "k"), sign("x", "k"));
        assert_ne!(sign("x", "k"), sign("y", "k"));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature = sign("The quick brown fox jumps over the lazy dog", "key");
        assert_eq!(
            signature,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
