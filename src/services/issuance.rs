//! Payment intent issuance
//!
//! The synchronous half of the payment flow: an intent is created with the
//! provider and mirrored into the ledger. From then on only the
//! reconciliation engine changes its status.

use crate::database::ledger::LedgerStore;
use crate::database::models::{IntentStatus, Metadata, NewPaymentIntent, PaymentIntent};
use crate::error::{AppResult, DomainError, ExternalError, ValidationError};
use crate::payments::types::{CreateIntentRequest, ProviderIntent, ProviderRefund};
use crate::payments::PaymentProvider;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Smallest chargeable amount in minor units
pub const DEFAULT_MIN_CHARGE_AMOUNT: i64 = 50;

static INTENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^pi_[A-Za-z0-9_]+$").expect("intent id pattern is a valid regex")
});

/// Only plain provider ids may be interpolated into a request path
fn is_valid_intent_id(value: &str) -> bool {
    INTENT_ID_PATTERN.is_match(value)
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueIntentRequest {
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub customer_id: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A persisted intent plus the secret the client confirms it with
#[derive(Debug, Clone)]
pub struct IssuedIntent {
    pub intent: PaymentIntent,
    pub client_secret: Option<String>,
}

pub struct IntentIssuanceService {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
    min_amount: i64,
}

impl IntentIssuanceService {
    pub fn new(store: Arc<dyn LedgerStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self::with_min_amount(store, provider, DEFAULT_MIN_CHARGE_AMOUNT)
    }

    pub fn with_min_amount(
        store: Arc<dyn LedgerStore>,
        provider: Arc<dyn PaymentProvider>,
        min_amount: i64,
    ) -> Self {
        Self {
            store,
            provider,
            min_amount,
        }
    }

    pub async fn issue(&self, request: IssueIntentRequest) -> AppResult<IssuedIntent> {
        if request.amount < self.min_amount {
            return Err(ValidationError::AmountBelowMinimum {
                amount: request.amount,
                minimum: self.min_amount,
            }
            .into());
        }
        let currency = request.currency.trim().to_lowercase();
        if currency.is_empty() {
            return Err(ValidationError::MissingField {
                field: "currency".to_string(),
            }
            .into());
        }

        let customer = self
            .store
            .find_customer_by_id(request.customer_id)
            .await?
            .ok_or_else(|| DomainError::CustomerNotFound {
                id: request.customer_id.to_string(),
            })?;

        let remote = self
            .provider
            .create_payment_intent(CreateIntentRequest {
                amount: request.amount,
                currency: currency.clone(),
                customer: customer.external_id.clone(),
                description: request.description.clone(),
                metadata: request.metadata.clone(),
            })
            .await?;

        let status = self.map_status(&remote)?;

        let intent = self
            .store
            .create_intent(NewPaymentIntent {
                external_id: remote.id.clone(),
                customer_id: customer.id,
                amount: request.amount,
                currency,
                status,
                description: request.description.unwrap_or_default(),
                metadata: request.metadata,
            })
            .await?;

        info!(
            intent_id = %intent.id,
            external_id = %intent.external_id,
            customer_id = %customer.id,
            amount = intent.amount,
            status = %intent.status,
            "Payment intent issued"
        );

        Ok(IssuedIntent {
            intent,
            client_secret: remote.client_secret,
        })
    }

    /// Live view of an intent from the provider. The ledger is not touched.
    pub async fn provider_status(&self, external_id: &str) -> AppResult<ProviderIntent> {
        if !is_valid_intent_id(external_id) {
            return Err(ValidationError::InvalidIntentId {
                value: external_id.to_string(),
            }
            .into());
        }
        self.provider.get_payment_intent(external_id).await
    }

    /// Refund a succeeded intent in full with the provider
    pub async fn refund(&self, intent_id: Uuid) -> AppResult<ProviderRefund> {
        let intent = self
            .store
            .find_intent_by_id(intent_id)
            .await?
            .ok_or_else(|| DomainError::IntentNotFound {
                id: intent_id.to_string(),
            })?;

        if intent.status != IntentStatus::Succeeded {
            return Err(DomainError::IntentNotRefundable {
                id: intent_id.to_string(),
                status: intent.status.to_string(),
            }
            .into());
        }

        let mut metadata = Metadata::new();
        metadata.insert("payment_intent_id".to_string(), intent.id.to_string());

        let refund = self
            .provider
            .create_refund(&intent.external_id, &metadata)
            .await?;

        info!(
            intent_id = %intent.id,
            refund_id = %refund.id,
            status = %refund.status,
            "Refund requested"
        );
        Ok(refund)
    }

    fn map_status(&self, remote: &ProviderIntent) -> AppResult<IntentStatus> {
        IntentStatus::from_provider(&remote.status).ok_or_else(|| {
            warn!(
                external_id = %remote.id,
                status = %remote.status,
                "Provider returned an unmapped intent status"
            );
            ExternalError::PaymentProvider {
                provider: self.provider.name().to_string(),
                message: format!("unmapped payment intent status '{}'", remote.status),
                is_retryable: false,
            }
            .into()
        })
    }
}
