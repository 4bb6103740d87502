use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub ledger: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let (status, code, ledger) = match state.store.health_check().await {
        Ok(()) => ("healthy", StatusCode::OK, "reachable".to_string()),
        Err(e) => {
            warn!("Ledger health check failed: {}", e);
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        version,
        environment: state.environment.to_string(),
        ledger,
    };

    (code, Json(response))
}
