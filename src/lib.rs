//! Payment ledger service
//!
//! Issues payment intents through the card provider and reconciles their
//! final state from signed provider webhooks.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
pub mod services;
pub mod webhooks;
