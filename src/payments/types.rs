//! Payment provider types and data structures

use crate::database::models::Metadata;
use serde::{Deserialize, Serialize};

/// Payment intent creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    /// Amount in smallest currency unit
    pub amount: i64,
    /// Currency code, passed through opaquely
    pub currency: String,
    /// Provider-side customer id
    pub customer: String,
    pub description: Option<String>,
    pub metadata: Metadata,
}

/// Customer as returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Payment intent as returned by the provider
///
/// `status` is the provider's raw status string; callers map it with
/// `IntentStatus::from_provider`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Refund as returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderRefund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}
