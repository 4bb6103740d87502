//! Request-path services behind the HTTP API

pub mod customers;
pub mod issuance;

pub use customers::{CreateCustomerRequest, CustomerService};
pub use issuance::{IntentIssuanceService, IssueIntentRequest, IssuedIntent};
