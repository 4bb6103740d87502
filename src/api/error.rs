use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};
use crate::webhooks::WebhookError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Error returned by every handler; renders as `{"error": "<message>"}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token")
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err.kind {
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::Domain(domain) => match domain {
                DomainError::CustomerNotFound { .. } | DomainError::IntentNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                DomainError::CustomerAlreadyExists { .. }
                | DomainError::CustomerInUse { .. }
                | DomainError::IntentNotRefundable { .. } => StatusCode::CONFLICT,
            },
            AppErrorKind::External(_) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Infrastructure(InfrastructureError::Database(db)) => match db.kind {
                DatabaseErrorKind::NotFound { .. } => StatusCode::NOT_FOUND,
                DatabaseErrorKind::UniqueConstraintViolation { .. }
                | DatabaseErrorKind::ForeignKeyViolation { .. } => StatusCode::CONFLICT,
                _ if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        AppError::from(err).into()
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExternalError, ValidationError};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                ValidationError::MissingField {
                    field: "currency".to_string(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::CustomerNotFound {
                    id: "c".to_string(),
                }
                .into(),
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::CustomerAlreadyExists {
                    email: "a@b.com".to_string(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                ExternalError::PaymentProvider {
                    provider: "Stripe".to_string(),
                    message: "down".to_string(),
                    is_retryable: true,
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (DatabaseError::timeout().into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                DatabaseError::new(DatabaseErrorKind::QueryError {
                    message: "syntax error".to_string(),
                })
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn test_webhook_errors() {
        assert_eq!(
            ApiError::from(WebhookError::invalid_signature("bad")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WebhookError::malformed("bad")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WebhookError::Storage(DatabaseError::timeout())).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
