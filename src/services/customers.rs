//! Customer management
//!
//! Customers are registered with the provider first; the ledger row mirrors
//! the provider-assigned id so intents can be created against it.

use crate::database::ledger::LedgerStore;
use crate::database::models::{Customer, NewCustomer};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::payments::PaymentProvider;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::info;
use uuid::Uuid;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

pub struct CustomerService {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn LedgerStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn create(&self, request: CreateCustomerRequest) -> AppResult<Customer> {
        let email = request.email.trim().to_lowercase();
        let name = request.name.trim().to_string();

        if email.is_empty() {
            return Err(ValidationError::MissingField {
                field: "email".to_string(),
            }
            .into());
        }
        if name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            }
            .into());
        }
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail { value: email }.into());
        }

        if self.store.find_customer_by_email(&email).await?.is_some() {
            return Err(DomainError::CustomerAlreadyExists { email }.into());
        }

        let remote = self.provider.create_customer(&email, &name).await?;

        let customer = self
            .store
            .create_customer(NewCustomer {
                external_id: remote.id,
                email: email.clone(),
                name,
            })
            .await
            .map_err(|e| {
                AppError::from_database(e, || DomainError::CustomerAlreadyExists {
                    email: email.clone(),
                })
            })?;

        info!(
            customer_id = %customer.id,
            external_id = %customer.external_id,
            provider = self.provider.name(),
            "Customer created"
        );
        Ok(customer)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Customer> {
        self.store
            .find_customer_by_id(id)
            .await?
            .ok_or_else(|| DomainError::CustomerNotFound { id: id.to_string() }.into())
    }

    pub async fn list(&self) -> AppResult<Vec<Customer>> {
        Ok(self.store.list_customers().await?)
    }

    /// Remove a customer from the ledger. Customers that own intents are kept.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        match self.store.delete_customer(id).await {
            Ok(true) => {
                info!(customer_id = %id, "Customer deleted");
                Ok(())
            }
            Ok(false) => Err(DomainError::CustomerNotFound { id: id.to_string() }.into()),
            Err(e) if e.is_constraint_violation() => {
                Err(DomainError::CustomerInUse { id: id.to_string() }.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
