use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::AppState;
use crate::database::models::{IntentStatus, Payment, PaymentIntent};
use crate::payments::types::ProviderRefund;
use crate::services::IssueIntentRequest;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct IntentStatusResponse {
    pub payment_intent_id: String,
    /// Raw status reported by the provider
    pub provider_status: String,
    pub status: Option<IntentStatus>,
    pub amount: i64,
    pub currency: String,
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<IssueIntentRequest>,
) -> Result<(StatusCode, Json<CreateIntentResponse>), ApiError> {
    let issued = state.intents.issue(request).await?;
    let intent = issued.intent;

    Ok((
        StatusCode::CREATED,
        Json(CreateIntentResponse {
            id: intent.id,
            payment_intent_id: intent.external_id,
            client_secret: issued.client_secret,
            status: intent.status,
            amount: intent.amount,
            currency: intent.currency,
        }),
    ))
}

pub async fn list_payment_intents(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentIntent>>, ApiError> {
    Ok(Json(state.store.list_intents().await?))
}

/// Live status of an intent as the provider sees it; `:id` is the provider id
pub async fn get_intent_status(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<IntentStatusResponse>, ApiError> {
    let remote = state.intents.provider_status(&external_id).await?;

    Ok(Json(IntentStatusResponse {
        status: IntentStatus::from_provider(&remote.status),
        payment_intent_id: remote.id,
        provider_status: remote.status,
        amount: remote.amount,
        currency: remote.currency,
    }))
}

pub async fn refund_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ProviderRefund>), ApiError> {
    let refund = state.intents.refund(id).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn list_payments(State(state): State<AppState>) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.store.list_payments().await?))
}
