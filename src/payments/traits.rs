//! Payment provider trait definitions
//!
//! Defines the interface the services use to talk to the provider.

use crate::database::models::Metadata;
use crate::error::AppResult;
use crate::payments::types::{
    CreateIntentRequest, ProviderCustomer, ProviderIntent, ProviderRefund,
};
use async_trait::async_trait;

/// Trait for payment provider implementations
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Register a customer with the provider
    ///
    /// # Returns
    /// * `ProviderCustomer` - Contains the provider-assigned customer id
    async fn create_customer(&self, email: &str, name: &str) -> AppResult<ProviderCustomer>;

    /// Create a payment intent for an existing provider customer
    ///
    /// # Arguments
    /// * `request` - Amount in minor units, currency, provider customer id and metadata
    ///
    /// # Returns
    /// * `ProviderIntent` - Contains the external id, client secret and initial status
    async fn create_payment_intent(&self, request: CreateIntentRequest)
        -> AppResult<ProviderIntent>;

    /// Fetch the provider's current view of a payment intent
    async fn get_payment_intent(&self, external_id: &str) -> AppResult<ProviderIntent>;

    /// Refund a settled payment intent in full
    async fn create_refund(
        &self,
        intent_external_id: &str,
        metadata: &Metadata,
    ) -> AppResult<ProviderRefund>;
}
