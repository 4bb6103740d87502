#![allow(dead_code)]

use async_trait::async_trait;
use payment_ledger::config::Config;
use payment_ledger::database::models::{
    Customer, IntentStatus, Metadata, NewCustomer, NewPaymentIntent, PaymentIntent,
};
use payment_ledger::database::{InMemoryLedgerStore, LedgerStore};
use payment_ledger::error::{AppResult, ExternalError};
use payment_ledger::payments::types::{
    CreateIntentRequest, ProviderCustomer, ProviderIntent, ProviderRefund,
};
use payment_ledger::payments::PaymentProvider;
use payment_ledger::webhooks::{SignatureVerifier, DEFAULT_TOLERANCE};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const AUTH_TOKEN: &str = "test-token";

/// Provider double that hands out sequential ids and remembers what it created
#[derive(Default)]
pub struct FakeProvider {
    next_id: AtomicU64,
    pub intents: Mutex<HashMap<String, ProviderIntent>>,
    pub refunds: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_available(&self) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExternalError::PaymentProvider {
                provider: "Fake".to_string(),
                message: "provider unavailable".to_string(),
                is_retryable: true,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "Fake"
    }

    async fn create_customer(&self, email: &str, name: &str) -> AppResult<ProviderCustomer> {
        self.check_available()?;
        Ok(ProviderCustomer {
            id: self.next("cus"),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
        })
    }

    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> AppResult<ProviderIntent> {
        self.check_available()?;
        let id = self.next("pi");
        let intent = ProviderIntent {
            id: id.clone(),
            amount: request.amount,
            currency: request.currency,
            status: "requires_payment_method".to_string(),
            client_secret: Some(format!("{}_secret", id)),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn get_payment_intent(&self, external_id: &str) -> AppResult<ProviderIntent> {
        self.check_available()?;
        self.intents
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .ok_or_else(|| {
                ExternalError::PaymentProvider {
                    provider: "Fake".to_string(),
                    message: format!("No such payment_intent: '{}'", external_id),
                    is_retryable: false,
                }
                .into()
            })
    }

    async fn create_refund(
        &self,
        intent_external_id: &str,
        _metadata: &Metadata,
    ) -> AppResult<ProviderRefund> {
        self.check_available()?;
        let intent = self.get_payment_intent(intent_external_id).await?;
        self.refunds
            .lock()
            .unwrap()
            .push(intent_external_id.to_string());
        Ok(ProviderRefund {
            id: self.next("re"),
            amount: intent.amount,
            currency: intent.currency,
            status: "succeeded".to_string(),
        })
    }
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("API_AUTH_TOKEN", AUTH_TOKEN),
        ("LEDGER_TIMEOUT_MS", "2000"),
    ]
    .into_iter()
    .collect();
    Config::from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
}

/// Signature header for `payload`, stamped now
pub fn sign(payload: &[u8]) -> String {
    verifier()
        .sign(payload, chrono::Utc::now().timestamp())
        .unwrap()
}

/// Raw payment intent event as the provider sends it
pub fn intent_event(event_type: &str, external_id: &str, amount: i64, status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}_{}", external_id, event_type),
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": external_id,
                "object": "payment_intent",
                "amount": amount,
                "currency": "usd",
                "status": status,
                "customer": "cus_seed"
            }
        }
    }))
    .unwrap()
}

pub async fn seed_customer(store: &InMemoryLedgerStore, email: &str) -> Customer {
    store
        .create_customer(NewCustomer {
            external_id: format!("cus_{}", email),
            email: email.to_string(),
            name: "Seed".to_string(),
        })
        .await
        .unwrap()
}

/// Customer plus an intent in `requires_action`
pub async fn seed_intent(store: &InMemoryLedgerStore, external_id: &str) -> PaymentIntent {
    let customer = seed_customer(store, &format!("{}@example.com", external_id)).await;
    store
        .create_intent(NewPaymentIntent {
            external_id: external_id.to_string(),
            customer_id: customer.id,
            amount: 1000,
            currency: "usd".to_string(),
            status: IntentStatus::RequiresAction,
            description: String::new(),
            metadata: Metadata::new(),
        })
        .await
        .unwrap()
}
