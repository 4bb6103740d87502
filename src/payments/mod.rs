//! Payment provider integration module
//!
//! Outbound calls to the card-payment provider. The ledger only consumes the
//! identifiers and status strings these calls return.

pub mod providers;
pub mod traits;
pub mod types;

pub use traits::PaymentProvider;
