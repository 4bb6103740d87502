//! Provider webhook handling
//!
//! Inbound notifications pass through three stages: the signature is checked
//! against the raw bytes, the payload is decoded into a [`DomainEvent`], and
//! the [`ReconciliationEngine`] applies it to the ledger.

pub mod event;
pub mod reconcile;
pub mod signature;

pub use event::{decode, DomainEvent, IntentEvent, IntentEventKind, IntentObject};
pub use reconcile::{Outcome, ReconciliationEngine};
pub use signature::{SignatureVerifier, DEFAULT_TOLERANCE, SIGNATURE_HEADER};

use crate::database::error::DatabaseError;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header missing, malformed, stale or not matching
    #[error("Invalid webhook signature: {reason}")]
    InvalidSignature { reason: String },

    /// Payload is not a decodable event
    #[error("Malformed webhook payload: {message}")]
    MalformedPayload { message: String },

    /// Ledger could not be read or written in time; the provider should redeliver
    #[error("Ledger unavailable: {0}")]
    Storage(#[from] DatabaseError),
}

impl WebhookError {
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Errors the provider must not retry
    pub fn is_client_error(&self) -> bool {
        !matches!(self, WebhookError::Storage(_))
    }
}

/// Verifies, decodes and applies inbound webhook deliveries
pub struct WebhookProcessor {
    verifier: SignatureVerifier,
    engine: ReconciliationEngine,
}

impl WebhookProcessor {
    pub fn new(verifier: SignatureVerifier, engine: ReconciliationEngine) -> Self {
        Self { verifier, engine }
    }

    /// Verify the raw payload and decode it. Nothing is parsed before the
    /// signature checks out.
    pub fn construct_event(&self, payload: &[u8], header: &str) -> Result<DomainEvent, WebhookError> {
        self.verifier.verify(payload, header)?;
        let event = decode(payload)?;
        debug!(event_id = ?event.event_id(), "Webhook verified and decoded");
        Ok(event)
    }

    pub async fn handle(&self, payload: &[u8], header: &str) -> Result<Outcome, WebhookError> {
        let event = self.construct_event(payload, header)?;
        self.engine.apply(&event).await
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }
}
