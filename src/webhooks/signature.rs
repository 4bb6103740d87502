//! Webhook signature verification
//!
//! The provider signs `"{timestamp}.{raw body}"` with HMAC-SHA256 keyed by the
//! endpoint secret and sends `t=<unix>,v1=<hex>[,v1=<hex>...]`. Several `v1`
//! entries appear while a secret is being rotated; any one matching is enough.

use crate::webhooks::WebhookError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

const SIGNATURE_SCHEME: &str = "v1";

/// Parsed signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let parsed = value.parse::<i64>().map_err(|_| {
                        WebhookError::invalid_signature("timestamp is not an integer")
                    })?;
                    timestamp = Some(parsed);
                }
                SIGNATURE_SCHEME => {
                    // A malformed entry can never match; skip it rather than fail the rest.
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::invalid_signature("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(WebhookError::invalid_signature("no v1 signatures"));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies inbound payloads against the shared endpoint secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify against the current wall clock
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify as of `now` (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(header)?;

        let age = now.saturating_sub(header.timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            warn!(
                timestamp = header.timestamp,
                now, "Webhook timestamp outside tolerance"
            );
            return Err(WebhookError::invalid_signature(
                "timestamp outside the tolerance window",
            ));
        }

        let mac = self.mac_for(header.timestamp, payload)?;
        let matched = header
            .signatures
            .iter()
            .any(|expected| mac.clone().verify_slice(expected).is_ok());

        if matched {
            Ok(())
        } else {
            Err(WebhookError::invalid_signature("no matching signature"))
        }
    }

    /// Produce a header value the way the provider does; used for tests and tooling.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mac = self.mac_for(timestamp, payload)?;
        Ok(format!(
            "t={},{}={}",
            timestamp,
            SIGNATURE_SCHEME,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| WebhookError::invalid_signature("unusable webhook secret"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}
