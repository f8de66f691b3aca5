//! Tests for HMAC signature verification.

use super::*;

const SECRET: &str = "wix-webhook-secret";
const BODY: &[u8] = br#"{"id":"bkg-1"}"#;

fn validator() -> HmacSignatureValidator {
    HmacSignatureValidator::new(SecretString::new(SECRET))
}

/// Verify that a signature computed with the same secret is accepted.
#[tokio::test]
async fn test_valid_signature_accepted() {
    let sig = compute_signature(SECRET, BODY).unwrap();
    assert!(validator().validate_signature(BODY, &sig).await.is_ok());
}

/// Verify that the `sha256=` prefix is tolerated.
#[tokio::test]
async fn test_prefixed_signature_accepted() {
    let sig = format!("sha256={}", compute_signature(SECRET, BODY).unwrap());
    assert!(validator().validate_signature(BODY, &sig).await.is_ok());
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let sig = compute_signature(SECRET, BODY).unwrap();
    let result = validator()
        .validate_signature(br#"{"id":"bkg-2"}"#, &sig)
        .await;
    assert!(matches!(result, Err(ValidationError::InvalidFormat { .. })));
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let sig = compute_signature("other-secret", BODY).unwrap();
    assert!(validator().validate_signature(BODY, &sig).await.is_err());
}

#[tokio::test]
async fn test_non_hex_signature_rejected() {
    let result = validator().validate_signature(BODY, "not-hex!").await;
    match result {
        Err(ValidationError::InvalidFormat { message, .. }) => {
            assert!(message.contains("hex"));
        }
        other => panic!("expected InvalidFormat, got {:?}", other),
    }
}

#[test]
fn test_compute_signature_is_deterministic_hex() {
    let a = compute_signature(SECRET, BODY).unwrap();
    let b = compute_signature(SECRET, BODY).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

/// Verify that an unusable secret is an error rather than an empty digest.
#[test]
fn test_compute_signature_rejects_empty_secret() {
    match compute_signature("", BODY) {
        Err(ValidationError::InvalidFormat { field, .. }) => assert_eq!(field, "secret"),
        other => panic!("expected InvalidFormat, got {:?}", other),
    }
}

#[test]
fn test_debug_redacts_secret() {
    let debug = format!("{:?}", validator());
    assert!(debug.contains("<REDACTED>"));
    assert!(!debug.contains(SECRET));
}
