//! Ledger record types
//!
//! Customers, payment intents and settled payments as they are persisted.
//! Each record carries an internal UUID and the provider-assigned external id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form key/value metadata attached to a payment intent.
pub type Metadata = BTreeMap<String, String>;

/// Payment intent status
///
/// `RequiresAction` is the initial state, `Processing` the only intermediate
/// one, and the remaining three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl IntentStatus {
    pub const TERMINAL: [IntentStatus; 3] = [
        IntentStatus::Succeeded,
        IntentStatus::Failed,
        IntentStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Failed => "failed",
            IntentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Whether moving from `self` to `next` goes forward in the state machine.
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        match self {
            IntentStatus::RequiresAction => next != IntentStatus::RequiresAction,
            IntentStatus::Processing => next.is_terminal(),
            _ => false,
        }
    }

    /// Map a provider status string into the closed internal enumeration.
    ///
    /// The provider reports several "waiting on the customer" states which all
    /// collapse into `RequiresAction`. Anything unrecognised yields `None`.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "requires_payment_method" | "requires_confirmation" | "requires_action"
            | "requires_capture" => Some(IntentStatus::RequiresAction),
            "processing" => Some(IntentStatus::Processing),
            "succeeded" => Some(IntentStatus::Succeeded),
            "failed" => Some(IntentStatus::Failed),
            "canceled" => Some(IntentStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown payment intent status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for IntentStatus {
    type Err = UnknownStatus;

    /// Parses the stored (internal) representation only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires_action" => Ok(IntentStatus::RequiresAction),
            "processing" => Ok(IntentStatus::Processing),
            "succeeded" => Ok(IntentStatus::Succeeded),
            "failed" => Ok(IntentStatus::Failed),
            "canceled" => Ok(IntentStatus::Canceled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Customer entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub external_id: String,
    pub email: String,
    pub name: String,
}

/// Payment intent entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub external_id: String,
    pub customer_id: Uuid,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub description: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub external_id: String,
    pub customer_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub description: String,
    pub metadata: Metadata,
}

/// Settled payment entity. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub external_id: String,
    pub payment_intent_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub external_id: String,
    pub payment_intent_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!IntentStatus::RequiresAction.is_terminal());
        assert!(!IntentStatus::Processing.is_terminal());
        assert!(IntentStatus::Succeeded.is_terminal());
        assert!(IntentStatus::Failed.is_terminal());
        assert!(IntentStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        use IntentStatus::*;
        assert!(RequiresAction.can_transition_to(Processing));
        assert!(RequiresAction.can_transition_to(Succeeded));
        assert!(Processing.can_transition_to(Canceled));
        assert!(!Processing.can_transition_to(RequiresAction));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Succeeded.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Succeeded));
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(
            IntentStatus::from_provider("requires_payment_method"),
            Some(IntentStatus::RequiresAction)
        );
        assert_eq!(
            IntentStatus::from_provider("succeeded"),
            Some(IntentStatus::Succeeded)
        );
        assert_eq!(IntentStatus::from_provider("refunded"), None);
    }

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in [
            IntentStatus::RequiresAction,
            IntentStatus::Processing,
            IntentStatus::Succeeded,
            IntentStatus::Failed,
            IntentStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<IntentStatus>(), Ok(status));
        }
        assert!("requires_payment_method".parse::<IntentStatus>().is_err());
    }
}
