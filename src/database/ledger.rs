use crate::database::error::DbResult;
use crate::database::models::{
    Customer, IntentStatus, NewCustomer, NewPayment, NewPaymentIntent, Payment, PaymentIntent,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of a conditional status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The intent was non-terminal and now carries the new status
    Updated(PaymentIntent),
    /// The intent was already terminal; nothing was written
    Unchanged(PaymentIntent),
}

/// Storage access for the payment ledger
///
/// Injected into the reconciliation engine and the services. Reads and
/// single-record writes go straight through; anything that has to pair a
/// read with a write runs inside a [`LedgerTransaction`] from [`begin`].
///
/// [`begin`]: LedgerStore::begin
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> DbResult<Box<dyn LedgerTransaction>>;

    /// Verify the backing store is reachable
    async fn health_check(&self) -> DbResult<()>;

    /// Insert a customer. Fails with a unique violation on a duplicate email or external id.
    async fn create_customer(&self, customer: NewCustomer) -> DbResult<Customer>;

    async fn find_customer_by_id(&self, id: Uuid) -> DbResult<Option<Customer>>;

    async fn find_customer_by_external_id(&self, external_id: &str) -> DbResult<Option<Customer>>;

    async fn find_customer_by_email(&self, email: &str) -> DbResult<Option<Customer>>;

    async fn list_customers(&self) -> DbResult<Vec<Customer>>;

    /// Delete a customer that owns no payment intents
    async fn delete_customer(&self, id: Uuid) -> DbResult<bool>;

    /// Insert a payment intent. The owning customer must exist.
    async fn create_intent(&self, intent: NewPaymentIntent) -> DbResult<PaymentIntent>;

    async fn find_intent_by_id(&self, id: Uuid) -> DbResult<Option<PaymentIntent>>;

    async fn find_intent_by_external_id(&self, external_id: &str)
        -> DbResult<Option<PaymentIntent>>;

    async fn list_intents(&self) -> DbResult<Vec<PaymentIntent>>;

    async fn find_payment_by_external_id(&self, external_id: &str) -> DbResult<Option<Payment>>;

    async fn list_payments(&self) -> DbResult<Vec<Payment>>;
}

/// A transaction over the ledger
///
/// Dropping the transaction without calling [`commit`] discards every
/// staged write.
///
/// [`commit`]: LedgerTransaction::commit
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Read a payment intent and hold it exclusively until the transaction ends
    async fn lock_intent_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<PaymentIntent>>;

    /// Set the status only if the stored status is non-terminal
    async fn update_intent_status(
        &mut self,
        intent_id: Uuid,
        status: IntentStatus,
    ) -> DbResult<StatusUpdate>;

    async fn find_payment_by_external_id(&mut self, external_id: &str)
        -> DbResult<Option<Payment>>;

    /// Insert a payment. Fails with a unique violation if the external id is taken.
    async fn create_payment(&mut self, payment: NewPayment) -> DbResult<Payment>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}
