mod common;

use common::{intent_event, seed_customer, verifier, FakeProvider};
use payment_ledger::database::models::{IntentStatus, Metadata};
use payment_ledger::database::{InMemoryLedgerStore, LedgerStore};
use payment_ledger::error::{AppErrorKind, DomainError, ValidationError};
use payment_ledger::services::{
    CreateCustomerRequest, CustomerService, IntentIssuanceService, IssueIntentRequest,
};
use payment_ledger::webhooks::{ReconciliationEngine, WebhookProcessor};
use std::sync::Arc;
use uuid::Uuid;

fn services(
    store: &InMemoryLedgerStore,
    provider: &Arc<FakeProvider>,
) -> (CustomerService, IntentIssuanceService) {
    let store: Arc<dyn LedgerStore> = Arc::new(store.clone());
    (
        CustomerService::new(store.clone(), provider.clone()),
        IntentIssuanceService::new(store, provider.clone()),
    )
}

fn request(customer_id: Uuid, amount: i64) -> IssueIntentRequest {
    IssueIntentRequest {
        amount,
        currency: "usd".to_string(),
        customer_id,
        description: Some("Order #42".to_string()),
        metadata: Metadata::from([("order_id".to_string(), "42".to_string())]),
    }
}

#[tokio::test]
async fn test_issue_mirrors_provider_intent() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let (customers, intents) = services(&store, &provider);

    let customer = customers
        .create(CreateCustomerRequest {
            email: "a@b.com".to_string(),
            name: "A".to_string(),
        })
        .await
        .unwrap();
    assert!(customer.external_id.starts_with("cus_"));

    let issued = intents.issue(request(customer.id, 1000)).await.unwrap();
    assert_eq!(issued.intent.status, IntentStatus::RequiresAction);
    assert_eq!(issued.intent.customer_id, customer.id);
    assert_eq!(issued.intent.description, "Order #42");
    assert_eq!(issued.intent.metadata.get("order_id").map(String::as_str), Some("42"));
    assert!(provider
        .intents
        .lock()
        .unwrap()
        .contains_key(&issued.intent.external_id));

    let stored = store
        .find_intent_by_external_id(&issued.intent.external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, issued.intent);
}

#[tokio::test]
async fn test_issue_validates_before_calling_provider() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let (_, intents) = services(&store, &provider);
    let customer = seed_customer(&store, "v@example.com").await;

    let err = intents.issue(request(customer.id, 49)).await.unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationError::AmountBelowMinimum { amount: 49, minimum: 50 })
    ));

    let mut no_currency = request(customer.id, 1000);
    no_currency.currency = " ".to_string();
    let err = intents.issue(no_currency).await.unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationError::MissingField { .. })
    ));

    let err = intents.issue(request(Uuid::new_v4(), 1000)).await.unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Domain(DomainError::CustomerNotFound { .. })
    ));

    assert!(provider.intents.lock().unwrap().is_empty());
    assert!(store.list_intents().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refund_only_after_success() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let (_, intents) = services(&store, &provider);
    let customer = seed_customer(&store, "r@example.com").await;
    let issued = intents.issue(request(customer.id, 2500)).await.unwrap();

    let err = intents.refund(issued.intent.id).await.unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Domain(DomainError::IntentNotRefundable { .. })
    ));

    let processor = WebhookProcessor::new(
        verifier(),
        ReconciliationEngine::new(Arc::new(store.clone())),
    );
    let payload = intent_event(
        "payment_intent.succeeded",
        &issued.intent.external_id,
        2500,
        "succeeded",
    );
    let header = verifier()
        .sign(&payload, chrono::Utc::now().timestamp())
        .unwrap();
    processor.handle(&payload, &header).await.unwrap();

    let refund = intents.refund(issued.intent.id).await.unwrap();
    assert_eq!(refund.amount, 2500);
    assert_eq!(
        provider.refunds.lock().unwrap().as_slice(),
        [issued.intent.external_id.clone()]
    );

    // The ledger keeps the settled status; refunds are tracked by the provider
    let stored = store
        .find_intent_by_id(issued.intent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IntentStatus::Succeeded);
}

#[tokio::test]
async fn test_provider_status_reads_live_intent() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let (_, intents) = services(&store, &provider);
    let customer = seed_customer(&store, "s@example.com").await;
    let issued = intents.issue(request(customer.id, 1000)).await.unwrap();

    let remote = intents
        .provider_status(&issued.intent.external_id)
        .await
        .unwrap();
    assert_eq!(remote.status, "requires_payment_method");
    assert!(intents.provider_status("pi_unknown").await.is_err());
}

#[tokio::test]
async fn test_provider_status_rejects_path_like_ids() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    provider
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let (_, intents) = services(&store, &provider);

    for id in ["../../v1/customers?limit=100", "pi_1/../refunds", ""] {
        let err = intents.provider_status(id).await.unwrap_err();
        assert!(matches!(
            err.kind,
            AppErrorKind::Validation(ValidationError::InvalidIntentId { .. })
        ));
    }
}

#[tokio::test]
async fn test_customer_with_intents_cannot_be_deleted() {
    let store = InMemoryLedgerStore::new();
    let provider = Arc::new(FakeProvider::new());
    let (customers, intents) = services(&store, &provider);
    let customer = seed_customer(&store, "d@example.com").await;
    intents.issue(request(customer.id, 1000)).await.unwrap();

    let err = customers.delete(customer.id).await.unwrap_err();
    assert!(matches!(
        err.kind,
        AppErrorKind::Domain(DomainError::CustomerInUse { .. })
    ));
    assert!(customers.get(customer.id).await.is_ok());
}
