//! In-process ledger store
//!
//! Backs tests and local runs without Postgres. Transactions on the same
//! payment intent are serialised by a per-external-id async mutex, so
//! unrelated intents never wait on each other. A lock entry is dropped once no
//! transaction holds or waits on it. Writes are staged inside the transaction
//! and only become visible on commit.

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::ledger::{LedgerStore, LedgerTransaction, StatusUpdate};
use crate::database::models::{
    Customer, IntentStatus, NewCustomer, NewPayment, NewPaymentIntent, Payment, PaymentIntent,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    customers: HashMap<Uuid, Customer>,
    intents: HashMap<Uuid, PaymentIntent>,
    payments: HashMap<Uuid, Payment>,
}

type IntentLocks = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// A thread-safe in-memory ledger
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    intent_locks: Arc<IntentLocks>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn intent_lock(&self, external_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .intent_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(external_id.to_string()).or_default().clone()
    }

    /// Forget lock entries nobody holds or waits on
    fn prune_intent_locks<'a>(&self, external_ids: impl Iterator<Item = &'a String>) {
        let mut locks = self
            .intent_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for external_id in external_ids {
            if locks
                .get(external_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(external_id);
            }
        }
    }

    #[cfg(test)]
    fn tracked_intent_locks(&self) -> usize {
        self.intent_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn sorted_by_creation<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (chrono::DateTime<Utc>, Uuid),
{
    items.sort_by_key(key);
    items
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> DbResult<Box<dyn LedgerTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            guards: Vec::new(),
            locked: HashSet::new(),
            intents: HashMap::new(),
            payments: Vec::new(),
        }))
    }

    async fn health_check(&self) -> DbResult<()> {
        Ok(())
    }

    async fn create_customer(&self, customer: NewCustomer) -> DbResult<Customer> {
        let mut tables = self.tables.write().await;
        for existing in tables.customers.values() {
            if existing.email == customer.email {
                return Err(DatabaseError::unique_violation("email", &customer.email));
            }
            if existing.external_id == customer.external_id {
                return Err(DatabaseError::unique_violation(
                    "external_id",
                    &customer.external_id,
                ));
            }
        }

        let now = Utc::now();
        let record = Customer {
            id: Uuid::new_v4(),
            external_id: customer.external_id,
            email: customer.email,
            name: customer.name,
            created_at: now,
            updated_at: now,
        };
        tables.customers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_customer_by_id(&self, id: Uuid) -> DbResult<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn find_customer_by_external_id(&self, external_id: &str) -> DbResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|c| c.external_id == external_id)
            .cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> DbResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| c.email == email).cloned())
    }

    async fn list_customers(&self) -> DbResult<Vec<Customer>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables.customers.values().cloned().collect(),
            |c| (c.created_at, c.id),
        ))
    }

    async fn delete_customer(&self, id: Uuid) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.intents.values().any(|i| i.customer_id == id) {
            return Err(DatabaseError::foreign_key_violation(
                "payment_intents",
                "customer_id",
            ));
        }
        Ok(tables.customers.remove(&id).is_some())
    }

    async fn create_intent(&self, intent: NewPaymentIntent) -> DbResult<PaymentIntent> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&intent.customer_id) {
            return Err(DatabaseError::foreign_key_violation(
                "customers",
                "customer_id",
            ));
        }
        if tables
            .intents
            .values()
            .any(|i| i.external_id == intent.external_id)
        {
            return Err(DatabaseError::unique_violation(
                "external_id",
                &intent.external_id,
            ));
        }

        let now = Utc::now();
        let record = PaymentIntent {
            id: Uuid::new_v4(),
            external_id: intent.external_id,
            customer_id: intent.customer_id,
            amount: intent.amount,
            currency: intent.currency,
            status: intent.status,
            description: intent.description,
            metadata: intent.metadata,
            created_at: now,
            updated_at: now,
        };
        tables.intents.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_intent_by_id(&self, id: Uuid) -> DbResult<Option<PaymentIntent>> {
        Ok(self.tables.read().await.intents.get(&id).cloned())
    }

    async fn find_intent_by_external_id(
        &self,
        external_id: &str,
    ) -> DbResult<Option<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .intents
            .values()
            .find(|i| i.external_id == external_id)
            .cloned())
    }

    async fn list_intents(&self) -> DbResult<Vec<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables.intents.values().cloned().collect(),
            |i| (i.created_at, i.id),
        ))
    }

    async fn find_payment_by_external_id(&self, external_id: &str) -> DbResult<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn list_payments(&self) -> DbResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables.payments.values().cloned().collect(),
            |p| (p.created_at, p.id),
        ))
    }
}

/// Unit of work over [`InMemoryLedgerStore`]
pub struct InMemoryTransaction {
    store: InMemoryLedgerStore,
    guards: Vec<OwnedMutexGuard<()>>,
    locked: HashSet<String>,
    intents: HashMap<Uuid, PaymentIntent>,
    payments: Vec<Payment>,
}

impl InMemoryTransaction {
    async fn current_intent(&self, intent_id: Uuid) -> Option<PaymentIntent> {
        if let Some(staged) = self.intents.get(&intent_id) {
            return Some(staged.clone());
        }
        self.store.tables.read().await.intents.get(&intent_id).cloned()
    }

    async fn intent_exists(&self, intent_id: Uuid) -> bool {
        self.current_intent(intent_id).await.is_some()
    }

    fn release_locks(&mut self) {
        self.guards.clear();
        self.store.prune_intent_locks(self.locked.iter());
        self.locked.clear();
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_intent_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<PaymentIntent>> {
        if !self.locked.contains(external_id) {
            let guard = self.store.intent_lock(external_id).lock_owned().await;
            self.guards.push(guard);
            self.locked.insert(external_id.to_string());
        }

        if let Some(staged) = self
            .intents
            .values()
            .find(|i| i.external_id == external_id)
        {
            return Ok(Some(staged.clone()));
        }

        let tables = self.store.tables.read().await;
        Ok(tables
            .intents
            .values()
            .find(|i| i.external_id == external_id)
            .cloned())
    }

    async fn update_intent_status(
        &mut self,
        intent_id: Uuid,
        status: IntentStatus,
    ) -> DbResult<StatusUpdate> {
        let current = self
            .current_intent(intent_id)
            .await
            .ok_or_else(|| DatabaseError::not_found("PaymentIntent", intent_id.to_string()))?;

        if current.status.is_terminal() {
            return Ok(StatusUpdate::Unchanged(current));
        }

        let updated = PaymentIntent {
            status,
            updated_at: Utc::now(),
            ..current
        };
        self.intents.insert(intent_id, updated.clone());
        Ok(StatusUpdate::Updated(updated))
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<Payment>> {
        if let Some(staged) = self.payments.iter().find(|p| p.external_id == external_id) {
            return Ok(Some(staged.clone()));
        }
        let tables = self.store.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn create_payment(&mut self, payment: NewPayment) -> DbResult<Payment> {
        if self
            .find_payment_by_external_id(&payment.external_id)
            .await?
            .is_some()
        {
            return Err(DatabaseError::unique_violation(
                "external_id",
                &payment.external_id,
            ));
        }
        if !self.intent_exists(payment.payment_intent_id).await {
            return Err(DatabaseError::foreign_key_violation(
                "payment_intents",
                "payment_intent_id",
            ));
        }

        let record = Payment {
            id: Uuid::new_v4(),
            external_id: payment.external_id,
            payment_intent_id: payment.payment_intent_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            created_at: Utc::now(),
        };
        self.payments.push(record.clone());
        Ok(record)
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        let store = self.store.clone();
        let intents = std::mem::take(&mut self.intents);
        let payments = std::mem::take(&mut self.payments);
        let mut tables = store.tables.write().await;

        for staged in intents.values() {
            match tables.intents.get(&staged.id) {
                None => {
                    return Err(DatabaseError::not_found(
                        "PaymentIntent",
                        staged.id.to_string(),
                    ))
                }
                Some(stored) if stored.status.is_terminal() => {
                    return Err(DatabaseError::new(DatabaseErrorKind::TransactionError {
                        message: format!(
                            "payment intent {} reached {} concurrently",
                            stored.external_id, stored.status
                        ),
                    }));
                }
                Some(_) => {}
            }
        }
        for staged in &payments {
            if tables
                .payments
                .values()
                .any(|p| p.external_id == staged.external_id)
            {
                return Err(DatabaseError::unique_violation(
                    "external_id",
                    &staged.external_id,
                ));
            }
        }

        debug!(
            intents = intents.len(),
            payments = payments.len(),
            "Committing in-memory ledger transaction"
        );
        for (id, intent) in intents {
            tables.intents.insert(id, intent);
        }
        for payment in payments {
            tables.payments.insert(payment.id, payment);
        }
        // intent guards drop after the writes are visible
        drop(tables);
        self.release_locks();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        debug!("Rolling back in-memory ledger transaction");
        Ok(())
    }
}
