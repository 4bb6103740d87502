use crate::api::error::ApiError;
use crate::api::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

/// Reject requests without `Authorization: Bearer <API_AUTH_TOKEN>`
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if tokens_match(token, &state.auth_token) => Ok(next.run(request).await),
        _ => {
            warn!(path = %request.uri().path(), "Rejected unauthenticated request");
            Err(ApiError::unauthorized())
        }
    }
}

// Compare MACs of both tokens so the check does not short-circuit on the first differing byte.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let mac_of = |token: &str| {
        Hmac::<Sha256>::new_from_slice(expected.as_bytes())
            .ok()
            .map(|mut mac| {
                mac.update(token.as_bytes());
                mac
            })
    };
    match (mac_of(expected), mac_of(presented)) {
        (Some(expected_mac), Some(presented_mac)) => presented_mac
            .verify_slice(&expected_mac.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}
