//! Stripe payment provider implementation
//!
//! Thin client over the Stripe REST API. Requests are form-encoded and
//! authenticated with the secret key. Each call is attempted once; the
//! caller decides whether to retry.

use crate::database::models::Metadata;
use crate::error::{AppError, AppResult, ExternalError, InfrastructureError};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{
    CreateIntentRequest, ProviderCustomer, ProviderIntent, ProviderRefund,
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER: &str = "Stripe";

/// Stripe provider configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe API secret key
    pub secret_key: String,
    /// Stripe API base URL (defaults to https://api.stripe.com)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Stripe payment provider
pub struct StripeProvider {
    config: StripeConfig,
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider instance
    pub fn new(config: StripeConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InfrastructureError::Configuration {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    fn provider_error(message: String, is_retryable: bool) -> AppError {
        ExternalError::PaymentProvider {
            provider: PROVIDER.to_string(),
            message,
            is_retryable,
        }
        .into()
    }

    /// Make an authenticated request to the Stripe API
    async fn make_request<T>(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<&[(String, String)]>,
    ) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.config.secret_key);

        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await.map_err(|e| {
            error!("Stripe request to {} failed: {}", endpoint, e);
            Self::provider_error(format!("request failed: {}", e), true)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Self::provider_error(format!("failed to read response: {}", e), true)
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));
            error!("Stripe API error on {}: {}", endpoint, message);
            return Err(Self::provider_error(
                message,
                status.is_server_error() || status.as_u16() == 429,
            ));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            error!("Failed to parse Stripe response: {}", e);
            Self::provider_error(format!("Invalid response format: {}", e), false)
        })
    }
}

/// Flatten metadata into Stripe's `metadata[key]=value` form fields
fn metadata_fields(metadata: &Metadata) -> impl Iterator<Item = (String, String)> + '_ {
    metadata
        .iter()
        .map(|(key, value)| (format!("metadata[{}]", key), value.clone()))
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn create_customer(&self, email: &str, name: &str) -> AppResult<ProviderCustomer> {
        info!("Creating Stripe customer: {}", email);

        let form = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        let customer: ProviderCustomer = self
            .make_request(Method::POST, "/v1/customers", Some(&form))
            .await?;

        info!("Stripe customer created: id={}", customer.id);
        Ok(customer)
    }

    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> AppResult<ProviderIntent> {
        info!(
            "Creating Stripe payment intent: {} {} customer={}",
            request.amount, request.currency, request.customer
        );

        let mut form = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("customer".to_string(), request.customer.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(description) = &request.description {
            form.push(("description".to_string(), description.clone()));
        }
        form.extend(metadata_fields(&request.metadata));

        let intent: ProviderIntent = self
            .make_request(Method::POST, "/v1/payment_intents", Some(&form))
            .await?;

        info!(
            "Stripe payment intent created: id={}, status={}",
            intent.id, intent.status
        );
        Ok(intent)
    }

    async fn get_payment_intent(&self, external_id: &str) -> AppResult<ProviderIntent> {
        info!("Fetching Stripe payment intent: id={}", external_id);
        self.make_request(
            Method::GET,
            &format!("/v1/payment_intents/{}", external_id),
            None,
        )
        .await
    }

    async fn create_refund(
        &self,
        intent_external_id: &str,
        metadata: &Metadata,
    ) -> AppResult<ProviderRefund> {
        info!("Creating Stripe refund for payment intent: {}", intent_external_id);

        let mut form = vec![(
            "payment_intent".to_string(),
            intent_external_id.to_string(),
        )];
        form.extend(metadata_fields(metadata));

        let refund: ProviderRefund = self
            .make_request(Method::POST, "/v1/refunds", Some(&form))
            .await?;

        info!(
            "Stripe refund created: id={}, status={}",
            refund.id, refund.status
        );
        Ok(refund)
    }
}

// Stripe error body: {"error": {"message": "...", "type": "..."}}
#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}
