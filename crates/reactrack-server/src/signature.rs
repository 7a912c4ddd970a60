//! `X-Hub-Signature-256` verification.
//!
//! The platform signs every webhook body with HMAC-SHA256 keyed by the app
//! secret and sends `sha256=<hex digest>` in the header.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::ServerError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, ServerError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| ServerError::Signature("unusable app secret"))
    }

    /// Header value for `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String, ServerError> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Check `header` against `body`. Comparison is constant-time.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), ServerError> {
        let header = header.ok_or(ServerError::Signature("missing signature header"))?;
        let digest = header
            .strip_prefix("sha256=")
            .ok_or(ServerError::Signature("unsupported signature method"))?;
        let expected =
            hex::decode(digest).map_err(|_| ServerError::Signature("malformed signature"))?;

        let mut mac = self.mac()?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| ServerError::Signature("signature mismatch"))
    }
}
