//! Payment state reconciliation
//!
//! Applies decoded provider events to the ledger. Each event for a payment
//! intent runs in one ledger transaction that holds the intent row, so
//! concurrent deliveries for the same intent are serialised while different
//! intents proceed independently.
//!
//! Terminal states are final: the first terminal status stored wins and
//! later contradicting events are acknowledged, logged and counted, never
//! written.

use crate::database::error::DatabaseError;
use crate::database::ledger::{LedgerStore, LedgerTransaction, StatusUpdate};
use crate::database::models::{IntentStatus, NewPayment, PaymentIntent};
use crate::webhooks::event::{DomainEvent, IntentEvent, IntentObject};
use crate::webhooks::WebhookError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// What applying an event did. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The intent moved to `status`; `payment_id` is set when a payment now exists for it
    Applied {
        intent_id: Uuid,
        external_id: String,
        status: IntentStatus,
        payment_id: Option<Uuid>,
    },
    /// The event was already reflected or is behind the stored status
    Unchanged {
        external_id: String,
        status: IntentStatus,
    },
    /// A terminal event disagreed with the stored terminal status
    TerminalConflict {
        external_id: String,
        stored: IntentStatus,
        incoming: IntentStatus,
    },
    /// No intent with this external id exists in the ledger
    UnknownIntent { external_id: String },
    /// Event type this service does not handle
    Ignored { kind: String },
}

/// State-machine core over `PaymentIntent.status`
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
    conflicts: AtomicU64,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_timeout(store, DEFAULT_LEDGER_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            conflicts: AtomicU64::new(0),
        }
    }

    /// Number of terminal-state conflicts seen since start-up
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub async fn apply(&self, event: &DomainEvent) -> Result<Outcome, WebhookError> {
        let event = match event {
            DomainEvent::Intent(event) => event,
            DomainEvent::Unknown { event_id, kind } => {
                info!(event_id = ?event_id, kind = %kind, "Ignoring unhandled event type");
                return Ok(Outcome::Ignored { kind: kind.clone() });
            }
        };

        // Dropping the in-flight future on timeout drops its transaction, which rolls back.
        match tokio::time::timeout(self.timeout, self.apply_intent_event(event)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    event_id = ?event.event_id,
                    external_id = %event.object.external_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Ledger timed out while applying event"
                );
                Err(DatabaseError::timeout()
                    .with_context(format!("applying event to {}", event.object.external_id))
                    .into())
            }
        }
    }

    async fn apply_intent_event(&self, event: &IntentEvent) -> Result<Outcome, WebhookError> {
        let external_id = &event.object.external_id;
        let target = event.kind.target_status();

        let mut tx = self.store.begin().await?;

        let Some(intent) = tx.lock_intent_by_external_id(external_id).await? else {
            tx.rollback().await?;
            warn!(
                event_id = ?event.event_id,
                external_id = %external_id,
                "Event references an unknown payment intent"
            );
            return Ok(Outcome::UnknownIntent {
                external_id: external_id.clone(),
            });
        };

        if !intent.status.can_transition_to(target) {
            tx.rollback().await?;
            return Ok(self.settled(&intent, target, event));
        }

        let updated = match tx.update_intent_status(intent.id, target).await? {
            StatusUpdate::Updated(updated) => updated,
            StatusUpdate::Unchanged(current) => {
                tx.rollback().await?;
                return Ok(self.settled(&current, target, event));
            }
        };

        let payment_id = if target == IntentStatus::Succeeded {
            record_payment(tx.as_mut(), &updated, &event.object).await?
        } else {
            None
        };

        tx.commit().await?;

        info!(
            event_id = ?event.event_id,
            external_id = %external_id,
            from = %intent.status,
            to = %updated.status,
            payment_id = ?payment_id,
            "Payment intent reconciled"
        );

        Ok(Outcome::Applied {
            intent_id: updated.id,
            external_id: updated.external_id,
            status: updated.status,
            payment_id,
        })
    }

    fn settled(&self, current: &PaymentIntent, incoming: IntentStatus, event: &IntentEvent) -> Outcome {
        if current.status.is_terminal() && incoming.is_terminal() && current.status != incoming {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            warn!(
                event_id = ?event.event_id,
                external_id = %current.external_id,
                stored = %current.status,
                incoming = %incoming,
                "Terminal status conflict, keeping stored status"
            );
            return Outcome::TerminalConflict {
                external_id: current.external_id.clone(),
                stored: current.status,
                incoming,
            };
        }

        debug!(
            event_id = ?event.event_id,
            external_id = %current.external_id,
            status = %current.status,
            "Event already reflected in ledger"
        );
        Outcome::Unchanged {
            external_id: current.external_id.clone(),
            status: current.status,
        }
    }
}

/// Create the settlement record for a succeeded intent, keyed on the event
/// object's external id. An existing payment is kept as is.
async fn record_payment(
    tx: &mut dyn LedgerTransaction,
    intent: &PaymentIntent,
    object: &IntentObject,
) -> Result<Option<Uuid>, WebhookError> {
    if object.amount != intent.amount {
        warn!(
            external_id = %intent.external_id,
            stored_amount = intent.amount,
            event_amount = object.amount,
            "Settled amount differs from intent amount"
        );
    }

    if let Some(existing) = tx.find_payment_by_external_id(&object.external_id).await? {
        debug!(payment_id = %existing.id, "Payment already recorded");
        return Ok(Some(existing.id));
    }

    let new_payment = NewPayment {
        external_id: object.external_id.clone(),
        payment_intent_id: intent.id,
        amount: object.amount,
        currency: object.currency.clone(),
        status: IntentStatus::Succeeded,
    };

    match tx.create_payment(new_payment).await {
        Ok(payment) => Ok(Some(payment.id)),
        Err(e) if e.is_unique_violation() => {
            debug!(external_id = %object.external_id, "Payment created concurrently");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
