//! Application error types
//!
//! Every service call returns [`AppResult`]. The HTTP layer maps the error
//! kind to a status code; nothing below the API knows about HTTP.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    pub kind: AppErrorKind,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::Infrastructure(InfrastructureError::Database(e)) => e.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Customer {id} not found")]
    CustomerNotFound { id: String },

    #[error("Payment intent {id} not found")]
    IntentNotFound { id: String },

    #[error("Customer with email '{email}' already exists")]
    CustomerAlreadyExists { email: String },

    #[error("Customer {id} still owns payment intents")]
    CustomerInUse { id: String },

    #[error("Payment intent {id} cannot be refunded in status {status}")]
    IntentNotRefundable { id: String, status: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount {amount} is below the minimum charge of {minimum}")]
    AmountBelowMinimum { amount: i64, minimum: i64 },

    #[error("Field '{field}' is required")]
    MissingField { field: String },

    #[error("'{value}' is not a valid email address")]
    InvalidEmail { value: String },

    #[error("'{value}' is not a valid payment intent id")]
    InvalidIntentId { value: String },
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("{0}")]
    Database(DatabaseError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

macro_rules! impl_from_for_app_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(err: $source) -> Self {
                    AppError::new(err.into())
                }
            }
        )*
    };
}

impl_from_for_app_error!(
    DomainError,
    ValidationError,
    ExternalError,
    InfrastructureError,
    DatabaseError,
);

impl From<DatabaseError> for AppErrorKind {
    fn from(err: DatabaseError) -> Self {
        AppErrorKind::Infrastructure(InfrastructureError::Database(err))
    }
}

impl AppError {
    /// Lift a storage error, turning constraint violations into domain errors
    /// the caller can act on.
    pub fn from_database(err: DatabaseError, on_unique: impl FnOnce() -> DomainError) -> Self {
        match err.kind {
            DatabaseErrorKind::UniqueConstraintViolation { .. } => on_unique().into(),
            _ => err.into(),
        }
    }
}
