//! Event decoding
//!
//! Turns a verified payload into a [`DomainEvent`]. Only payment intent
//! events are interpreted; every other type decodes into
//! [`DomainEvent::Unknown`] without touching the embedded object.

use crate::database::models::IntentStatus;
use crate::webhooks::WebhookError;
use serde::Deserialize;

/// Payment intent event kinds the engine acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentEventKind {
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl IntentEventKind {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "payment_intent.processing" => Some(IntentEventKind::Processing),
            "payment_intent.succeeded" => Some(IntentEventKind::Succeeded),
            "payment_intent.payment_failed" => Some(IntentEventKind::Failed),
            "payment_intent.canceled" => Some(IntentEventKind::Canceled),
            _ => None,
        }
    }

    /// Status the intent moves to when this event is applied
    pub fn target_status(&self) -> IntentStatus {
        match self {
            IntentEventKind::Processing => IntentStatus::Processing,
            IntentEventKind::Succeeded => IntentStatus::Succeeded,
            IntentEventKind::Failed => IntentStatus::Failed,
            IntentEventKind::Canceled => IntentStatus::Canceled,
        }
    }
}

/// The payment intent embedded in an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentObject {
    pub external_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub customer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentEvent {
    pub event_id: Option<String>,
    pub kind: IntentEventKind,
    pub object: IntentObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Intent(IntentEvent),
    /// Any event type this service does not handle, kept for acknowledgement
    Unknown {
        event_id: Option<String>,
        kind: String,
    },
}

impl DomainEvent {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            DomainEvent::Intent(event) => event.event_id.as_deref(),
            DomainEvent::Unknown { event_id, .. } => event_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    customer: Option<CustomerRef>,
}

/// The provider sends either the bare id or the expanded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CustomerRef {
    Id(String),
    Object { id: String },
}

impl CustomerRef {
    fn into_id(self) -> String {
        match self {
            CustomerRef::Id(id) | CustomerRef::Object { id } => id,
        }
    }
}

/// Decode a raw, already verified payload
pub fn decode(payload: &[u8]) -> Result<DomainEvent, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::malformed(format!("invalid event JSON: {}", e)))?;

    let Some(kind) = IntentEventKind::from_event_type(&raw.event_type) else {
        return Ok(DomainEvent::Unknown {
            event_id: raw.id,
            kind: raw.event_type,
        });
    };

    let data = raw
        .data
        .ok_or_else(|| WebhookError::malformed("event is missing data.object"))?;
    let intent: RawIntent = serde_json::from_value(data.object)
        .map_err(|e| WebhookError::malformed(format!("invalid payment intent object: {}", e)))?;

    if intent.id.trim().is_empty() {
        return Err(WebhookError::malformed("payment intent id is empty"));
    }
    if intent.amount < 0 {
        return Err(WebhookError::malformed(format!(
            "negative amount {}",
            intent.amount
        )));
    }
    let status = IntentStatus::from_provider(&intent.status).ok_or_else(|| {
        WebhookError::malformed(format!("unmapped payment intent status '{}'", intent.status))
    })?;

    Ok(DomainEvent::Intent(IntentEvent {
        event_id: raw.id,
        kind,
        object: IntentObject {
            external_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
            status,
            customer: intent.customer.map(CustomerRef::into_id),
        },
    }))
}
