// dairy_storefront/src/lib.rs

//! Dairy storefront core: catalog, delivery-slot checkout, manual UPI payment
//! verification, milk subscriptions, refunds and delivery hand-over.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

pub use errors::{AppError, Result};
pub use state::AppState;
