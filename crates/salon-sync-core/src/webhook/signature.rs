//! HMAC-SHA256 webhook signature verification.

use super::SignatureValidator;
use crate::{SecretString, ValidationError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::instrument;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 of `payload` under `secret`.
///
/// This is the value Wix-side senders place in `x-wix-signature`.
///
/// # Examples
///
/// ```rust
/// use salon_sync_core::webhook::signature::compute_signature;
///
/// let sig = compute_signature("secret", b"{}").unwrap();
/// assert_eq!(sig.len(), 64);
/// assert!(compute_signature("", b"{}").is_err());
/// ```
///
/// # Errors
///
/// Returns [`ValidationError::InvalidFormat`] for an empty secret or one the
/// HMAC implementation rejects.
pub fn compute_signature(secret: &str, payload: &[u8]) -> Result<String, ValidationError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn keyed_mac(secret: &str) -> Result<HmacSha256, ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::InvalidFormat {
            field: "secret".to_string(),
            message: "secret must not be empty".to_string(),
        });
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ValidationError::InvalidFormat {
        field: "secret".to_string(),
        message: "secret cannot be used as HMAC key".to_string(),
    })
}

/// A [`SignatureValidator`] backed by a shared secret from configuration.
///
/// Accepts a bare hex digest or one prefixed with `sha256=`. The digest
/// comparison is constant time.
pub struct HmacSignatureValidator {
    secret: SecretString,
}

impl HmacSignatureValidator {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

impl std::fmt::Debug for HmacSignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSignatureValidator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl SignatureValidator for HmacSignatureValidator {
    /// Validate a HMAC-SHA256 webhook signature.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidFormat`] when `signature` is not
    /// valid hex or the computed digest does not match.
    #[instrument(skip(self, payload, signature), fields(sig_len = signature.len()))]
    async fn validate_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), ValidationError> {
        let sig_bytes = {
            let hex_part = signature.trim();
            let hex_part = hex_part.strip_prefix("sha256=").unwrap_or(hex_part);
            hex::decode(hex_part).map_err(|_| ValidationError::InvalidFormat {
                field: "signature".to_string(),
                message: "signature is not valid hex".to_string(),
            })?
        };

        let mut mac = keyed_mac(self.secret.expose_secret())?;
        mac.update(payload);

        mac.verify_slice(&sig_bytes)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "signature".to_string(),
                message: "HMAC-SHA256 digest does not match".to_string(),
            })
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
