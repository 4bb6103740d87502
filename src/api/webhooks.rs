use crate::api::error::ApiError;
use crate::api::AppState;
use crate::webhooks::{WebhookError, SIGNATURE_HEADER};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Provider webhook endpoint. Every outcome the engine can resolve is a 200;
/// only bad signatures, bad payloads and ledger failures are not.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| WebhookError::invalid_signature("missing Stripe-Signature header"))?;

    let outcome = state.webhooks.handle(&body, signature).await.map_err(|e| {
        warn!("Webhook rejected: {}", e);
        e
    })?;

    debug!(?outcome, "Webhook acknowledged");
    Ok(Json(json!({ "status": "success" })))
}
