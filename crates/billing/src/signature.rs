//! Creem webhook signature verification
//!
//! Creem signs the raw request body with HMAC-SHA256 and sends the
//! hex-encoded digest in the `creem-signature` header. Verification runs
//! on the exact bytes received, before any JSON parsing: re-serializing
//! the body can change it byte-for-byte and invalidate the signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook signature.
///
/// Returns `false` — never an error — for any malformed input: missing
/// secret, empty payload, non-hex signature, or digest length mismatch.
/// Comparison is constant-time to avoid timing side-channels.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &str) -> bool {
    // Strip whitespace some proxies introduce into the header value
    let received: String = signature_header
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if received.is_empty() || secret.is_empty() || payload.is_empty() {
        return false;
    }

    let Ok(received_bytes) = hex::decode(&received) else {
        tracing::warn!("Webhook signature is not valid hex");
        return false;
    };

    let expected = match compute_digest(payload, secret) {
        Some(digest) => digest,
        None => return false,
    };

    if received_bytes.len() != expected.len() {
        tracing::warn!(
            received_len = received_bytes.len(),
            expected_len = expected.len(),
            "Webhook signature length mismatch"
        );
        return false;
    }

    received_bytes.ct_eq(&expected).into()
}

/// Compute the hex-encoded signature for a payload.
///
/// Used by tests and local webhook tooling to produce valid signatures.
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    compute_digest(payload, secret)
        .map(hex::encode)
        .unwrap_or_default()
}

fn compute_digest(payload: &[u8], secret: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"id":"evt_1","eventType":"checkout.completed"}"#;
        let sig = compute_signature(payload, SECRET);
        assert!(verify_signature(payload, &sig, SECRET));
    }

    #[test]
    fn accepts_signature_with_surrounding_whitespace() {
        let payload = b"payload";
        let sig = format!("  {}\n", compute_signature(payload, SECRET));
        assert!(verify_signature(payload, &sig, SECRET));
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = br#"{"id":"evt_1","amount":100}"#;
        let sig = compute_signature(payload, SECRET);
        let tampered = br#"{"id":"evt_1","amount":999}"#;
        assert!(!verify_signature(tampered, &sig, SECRET));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = b"payload";
        let sig = compute_signature(payload, "whsec_other");
        assert!(!verify_signature(payload, &sig, SECRET));
    }

    #[test]
    fn rejects_malformed_inputs() {
        let payload = b"payload";
        let sig = compute_signature(payload, SECRET);

        assert!(!verify_signature(payload, "", SECRET));
        assert!(!verify_signature(payload, "not-hex!", SECRET));
        assert!(!verify_signature(payload, "deadbeef", SECRET)); // truncated digest
        assert!(!verify_signature(payload, &sig, ""));
        assert!(!verify_signature(b"", &sig, SECRET));
    }
}
