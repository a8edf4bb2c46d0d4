//! HMAC signature verification for inbound webhook bodies.
//!
//! The provider signs the raw request body with a shared secret and sends
//! the hex digest in `X-Webhook-Signature`, optionally prefixed with the
//! algorithm name (`sha256=<hex>`). Verification must run on the raw bytes
//! before anything parses them.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Sha256, Sha512};
use tracing::warn;

use crate::config::WebhookConfig;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    HmacSha256,
    HmacSha512,
}

impl SignatureAlgorithm {
    /// Prefix the provider may put in front of the hex digest.
    fn header_prefix(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "sha256=",
            Self::HmacSha512 => "sha512=",
        }
    }
}

impl std::str::FromStr for SignatureAlgorithm {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "hmac-sha256" | "hmac_sha256" => Ok(Self::HmacSha256),
            "sha512" | "hmac-sha512" | "hmac_sha512" => Ok(Self::HmacSha512),
            other => Err(format!("Unsupported signature algorithm: {other}")),
        }
    }
}

/// Verifies webhook signatures against the shared secret.
///
/// A verifier built without a secret or algorithm rejects everything.
pub struct SignatureVerifier {
    key: Option<(SecretString, SignatureAlgorithm)>,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString, algorithm: SignatureAlgorithm) -> Self {
        Self {
            key: Some((secret, algorithm)),
        }
    }

    /// A verifier that fails every check.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Build from config. Missing or unknown settings yield a disabled
    /// verifier and a warning; they never turn verification off.
    pub fn from_config(config: &WebhookConfig) -> Self {
        let Some(secret) = config.signing_secret.clone() else {
            warn!("Webhook signing secret not configured; all deliveries will be rejected");
            return Self::disabled();
        };
        let Some(raw_algorithm) = config.algorithm.as_deref() else {
            warn!("Webhook signature algorithm not configured; all deliveries will be rejected");
            return Self::disabled();
        };
        match raw_algorithm.parse::<SignatureAlgorithm>() {
            Ok(algorithm) => Self::new(secret, algorithm),
            Err(e) => {
                warn!(error = %e, "All webhook deliveries will be rejected");
                Self::disabled()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Check `signature` against `body`.
    ///
    /// Missing, malformed and mismatched signatures all return `false`.
    /// The digest comparison is constant time.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> bool {
        let Some((secret, algorithm)) = &self.key else {
            return false;
        };
        let Some(signature) = signature else {
            return false;
        };
        let signature = signature.trim();
        let hex_digest = signature
            .strip_prefix(algorithm.header_prefix())
            .unwrap_or(signature);
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };

        let key = secret.expose_secret().as_bytes();
        match algorithm {
            SignatureAlgorithm::HmacSha256 => verify_mac::<Hmac<Sha256>>(key, body, &expected),
            SignatureAlgorithm::HmacSha512 => verify_mac::<Hmac<Sha512>>(key, body, &expected),
        }
    }

    /// Hex signature for `body`, as the provider would send it.
    /// `None` when the verifier is disabled.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let (secret, algorithm) = self.key.as_ref()?;
        let key = secret.expose_secret().as_bytes();
        let digest = match algorithm {
            SignatureAlgorithm::HmacSha256 => compute_mac::<Hmac<Sha256>>(key, body)?,
            SignatureAlgorithm::HmacSha512 => compute_mac::<Hmac<Sha512>>(key, body)?,
        };
        Some(hex::encode(digest))
    }
}

fn verify_mac<M: Mac + KeyInit>(key: &[u8], body: &[u8], expected: &[u8]) -> bool {
    let Ok(mut mac) = <M as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(expected).is_ok()
}

fn compute_mac<M: Mac + KeyInit>(key: &[u8], body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = <M as Mac>::new_from_slice(key).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}
