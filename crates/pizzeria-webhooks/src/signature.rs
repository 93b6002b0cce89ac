//! HMAC-SHA256 verification of webhook payloads.
//!
//! The MAC is computed over the exact bytes received on the wire. Parsing
//! and re-encoding the body first can reorder keys or change whitespace and
//! break otherwise valid signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Result of checking a signature header against a provider secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No secret configured for the provider; the check is off.
    Disabled,
    Valid,
    /// A secret is configured but the request carries no signature.
    Missing,
    Invalid,
}

impl SignatureCheck {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Disabled | Self::Valid)
    }
}

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Classify `provided` against the expected signature for `body`.
pub fn check_signature(body: &[u8], secret: Option<&str>, provided: Option<&str>) -> SignatureCheck {
    let Some(secret) = secret else {
        return SignatureCheck::Disabled;
    };
    let Some(provided) = provided.map(str::trim).filter(|s| !s.is_empty()) else {
        return SignatureCheck::Missing;
    };

    let expected = compute_signature(secret, body);
    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

/// Whether a request with `body` and signature header `provided` passes.
///
/// Always true when `secret` is `None`.
pub fn verify_signature(body: &[u8], secret: Option<&str>, provided: Option<&str>) -> bool {
    check_signature(body, secret, provided).is_accepted()
}

/// Constant-time byte comparison. Slices of different length compare
/// unequal without an early exit on content.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_pizzeria_test";
    const BODY: &[u8] = br#"{"event":"message_created","id":42}"#;

    #[test]
    fn test_compute_signature_known_vector() {
        // RFC 4231 test case 2
        let sig = compute_signature("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_valid_signature() {
        let sig = compute_signature(SECRET, BODY);
        assert_eq!(check_signature(BODY, Some(SECRET), Some(&sig)), SignatureCheck::Valid);
        assert!(verify_signature(BODY, Some(SECRET), Some(&sig)));
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let sig = format!(" {} ", compute_signature(SECRET, BODY));
        assert!(verify_signature(BODY, Some(SECRET), Some(&sig)));
    }

    #[test]
    fn test_no_secret_disables_check() {
        assert_eq!(check_signature(BODY, None, None), SignatureCheck::Disabled);
        assert!(verify_signature(BODY, None, Some("anything")));
        assert!(verify_signature(BODY, None, None));
    }

    #[test]
    fn test_missing_signature() {
        assert_eq!(check_signature(BODY, Some(SECRET), None), SignatureCheck::Missing);
        assert_eq!(check_signature(BODY, Some(SECRET), Some("")), SignatureCheck::Missing);
        assert!(!verify_signature(BODY, Some(SECRET), None));
    }

    #[test]
    fn test_length_mismatch_is_invalid() {
        let sig = compute_signature(SECRET, BODY);
        assert_eq!(
            check_signature(BODY, Some(SECRET), Some(&sig[..10])),
            SignatureCheck::Invalid
        );
        let longer = format!("{sig}00");
        assert_eq!(
            check_signature(BODY, Some(SECRET), Some(&longer)),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn test_wrong_secret() {
        let sig = compute_signature("other-secret", BODY);
        assert!(!verify_signature(BODY, Some(SECRET), Some(&sig)));
    }

    #[test]
    fn test_reserialized_body_fails() {
        let sig = compute_signature(SECRET, BODY);
        let parsed: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&parsed).unwrap();
        assert!(!verify_signature(&pretty, Some(SECRET), Some(&sig)));
    }
}
