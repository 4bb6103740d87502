use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::ledger::{LedgerStore, LedgerTransaction, StatusUpdate};
use crate::database::models::{
    Customer, IntentStatus, Metadata, NewCustomer, NewPayment, NewPaymentIntent, Payment,
    PaymentIntent,
};
use crate::database::transaction::DatabaseTransaction;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_create_ledger.sql");

/// Customer row
#[derive(Debug, Clone, FromRow)]
struct CustomerRow {
    id: Uuid,
    external_id: String,
    email: String,
    name: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Payment intent row. Status is stored as text.
#[derive(Debug, Clone, FromRow)]
struct IntentRow {
    id: Uuid,
    external_id: String,
    customer_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    description: String,
    metadata: Json<Metadata>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = DatabaseError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            status: parse_status(&row.status)?,
            id: row.id,
            external_id: row.external_id,
            customer_id: row.customer_id,
            amount: row.amount,
            currency: row.currency,
            description: row.description,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Payment row
#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    external_id: String,
    payment_intent_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            status: parse_status(&row.status)?,
            id: row.id,
            external_id: row.external_id,
            payment_intent_id: row.payment_intent_id,
            amount: row.amount,
            currency: row.currency,
            created_at: row.created_at,
        })
    }
}

fn parse_status(raw: &str) -> DbResult<IntentStatus> {
    raw.parse::<IntentStatus>().map_err(|e| {
        DatabaseError::new(DatabaseErrorKind::QueryError {
            message: e.to_string(),
        })
    })
}

fn intent_from_row(row: Option<IntentRow>) -> DbResult<Option<PaymentIntent>> {
    row.map(PaymentIntent::try_from).transpose()
}

fn payment_from_row(row: Option<PaymentRow>) -> DbResult<Option<Payment>> {
    row.map(Payment::try_from).transpose()
}

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the ledger tables if they are missing
    pub async fn ensure_schema(&self) -> DbResult<()> {
        info!("Ensuring ledger schema");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> DbResult<Box<dyn LedgerTransaction>> {
        let tx = DatabaseTransaction::begin(&self.pool).await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn health_check(&self) -> DbResult<()> {
        crate::database::health_check(&self.pool).await
    }

    async fn create_customer(&self, customer: NewCustomer) -> DbResult<Customer> {
        sqlx::query_as::<_, CustomerRow>(
            "INSERT INTO customers (id, external_id, email, name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, NOW(), NOW())
             RETURNING id, external_id, email, name, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&customer.external_id)
        .bind(&customer.email)
        .bind(&customer.name)
        .fetch_one(&self.pool)
        .await
        .map(Customer::from)
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_customer_by_id(&self, id: Uuid) -> DbResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, external_id, email, name, created_at, updated_at
             FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_customer_by_external_id(&self, external_id: &str) -> DbResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, external_id, email, name, created_at, updated_at
             FROM customers WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_customer_by_email(&self, email: &str) -> DbResult<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, external_id, email, name, created_at, updated_at
             FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_customers(&self) -> DbResult<Vec<Customer>> {
        sqlx::query_as::<_, CustomerRow>(
            "SELECT id, external_id, email, name, created_at, updated_at
             FROM customers ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Customer::from).collect())
        .map_err(DatabaseError::from_sqlx)
    }

    async fn delete_customer(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_intent(&self, intent: NewPaymentIntent) -> DbResult<PaymentIntent> {
        let row = sqlx::query_as::<_, IntentRow>(
            "INSERT INTO payment_intents
             (id, external_id, customer_id, amount, currency, status, description, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
             RETURNING id, external_id, customer_id, amount, currency, status, description,
                       metadata, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&intent.external_id)
        .bind(intent.customer_id)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(intent.status.as_str())
        .bind(&intent.description)
        .bind(Json(&intent.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        PaymentIntent::try_from(row)
    }

    async fn find_intent_by_id(&self, id: Uuid) -> DbResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(
            "SELECT id, external_id, customer_id, amount, currency, status, description,
                    metadata, created_at, updated_at
             FROM payment_intents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        intent_from_row(row)
    }

    async fn find_intent_by_external_id(
        &self,
        external_id: &str,
    ) -> DbResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(
            "SELECT id, external_id, customer_id, amount, currency, status, description,
                    metadata, created_at, updated_at
             FROM payment_intents WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        intent_from_row(row)
    }

    async fn list_intents(&self) -> DbResult<Vec<PaymentIntent>> {
        sqlx::query_as::<_, IntentRow>(
            "SELECT id, external_id, customer_id, amount, currency, status, description,
                    metadata, created_at, updated_at
             FROM payment_intents ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(PaymentIntent::try_from)
        .collect()
    }

    async fn find_payment_by_external_id(&self, external_id: &str) -> DbResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, external_id, payment_intent_id, amount, currency, status, created_at
             FROM payments WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        payment_from_row(row)
    }

    async fn list_payments(&self) -> DbResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT id, external_id, payment_intent_id, amount, currency, status, created_at
             FROM payments ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }
}

/// Unit of work over [`PgLedgerStore`]
pub struct PgLedgerTransaction {
    tx: DatabaseTransaction,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_intent_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(
            "SELECT id, external_id, customer_id, amount, currency, status, description,
                    metadata, created_at, updated_at
             FROM payment_intents WHERE external_id = $1
             FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(self.tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        intent_from_row(row)
    }

    async fn update_intent_status(
        &mut self,
        intent_id: Uuid,
        status: IntentStatus,
    ) -> DbResult<StatusUpdate> {
        // The WHERE clause is the guard: a terminal row matches nothing.
        let updated = sqlx::query_as::<_, IntentRow>(
            "UPDATE payment_intents SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status NOT IN ('succeeded', 'failed', 'canceled')
             RETURNING id, external_id, customer_id, amount, currency, status, description,
                       metadata, created_at, updated_at",
        )
        .bind(status.as_str())
        .bind(intent_id)
        .fetch_optional(self.tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = updated {
            return Ok(StatusUpdate::Updated(PaymentIntent::try_from(row)?));
        }

        debug!(%intent_id, "Conditional status update matched no row");
        let current = sqlx::query_as::<_, IntentRow>(
            "SELECT id, external_id, customer_id, amount, currency, status, description,
                    metadata, created_at, updated_at
             FROM payment_intents WHERE id = $1",
        )
        .bind(intent_id)
        .fetch_optional(self.tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match intent_from_row(current)? {
            Some(intent) => Ok(StatusUpdate::Unchanged(intent)),
            None => Err(DatabaseError::not_found(
                "PaymentIntent",
                intent_id.to_string(),
            )),
        }
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, external_id, payment_intent_id, amount, currency, status, created_at
             FROM payments WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(self.tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        payment_from_row(row)
    }

    async fn create_payment(&mut self, payment: NewPayment) -> DbResult<Payment> {
        // ON CONFLICT keeps the transaction usable when the row already exists.
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments
             (id, external_id, payment_intent_id, amount, currency, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (external_id) DO NOTHING
             RETURNING id, external_id, payment_intent_id, amount, currency, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&payment.external_id)
        .bind(payment.payment_intent_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .fetch_optional(self.tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => Payment::try_from(row),
            None => Err(DatabaseError::unique_violation(
                "external_id",
                &payment.external_id,
            )),
        }
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await
    }
}
