//! HTTP surface
//!
//! `/health` and `POST /api/v1/webhooks` are public; the webhook route is
//! authenticated by its signature. Every other `/api/v1` route needs the
//! bearer token.

pub mod auth;
pub mod customers;
pub mod error;
pub mod extract;
pub mod health;
pub mod payments;
pub mod webhooks;

use crate::config::Config;
use crate::database::ledger::LedgerStore;
use crate::payments::PaymentProvider;
use crate::services::{CustomerService, IntentIssuanceService};
use crate::webhooks::{ReconciliationEngine, SignatureVerifier, WebhookProcessor};
use axum::body::Body;
use axum::routing::{get, post};
use axum::{middleware, Router};
use http::Request;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub customers: Arc<CustomerService>,
    pub intents: Arc<IntentIssuanceService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub auth_token: Arc<str>,
    pub environment: Arc<str>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn LedgerStore>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let verifier = SignatureVerifier::new(
            config.stripe.webhook_secret.as_bytes(),
            config.webhook.tolerance(),
        );
        let engine = ReconciliationEngine::with_timeout(store.clone(), config.webhook.ledger_timeout());

        Self {
            customers: Arc::new(CustomerService::new(store.clone(), provider.clone())),
            intents: Arc::new(IntentIssuanceService::with_min_amount(
                store.clone(),
                provider,
                config.api.min_charge_amount,
            )),
            webhooks: Arc::new(WebhookProcessor::new(verifier, engine)),
            auth_token: Arc::from(config.api.auth_token.as_str()),
            environment: Arc::from(config.server.environment.as_str()),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/customers",
            post(customers::create_customer).get(customers::list_customers),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer).delete(customers::delete_customer),
        )
        .route(
            "/payment-intents",
            post(payments::create_payment_intent).get(payments::list_payment_intents),
        )
        .route("/payment-intents/:id/status", get(payments::get_intent_status))
        .route(
            "/payment-intents/:id/refunds",
            post(payments::refund_payment_intent),
        )
        .route("/payments", get(payments::list_payments))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let api = Router::new()
        .route("/webhooks", post(webhooks::receive_webhook))
        .merge(protected);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
