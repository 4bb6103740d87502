//! Payment provider implementations
//!
//! Concrete implementations of the PaymentProvider trait.

pub mod stripe;

pub use stripe::{StripeConfig, StripeProvider};
