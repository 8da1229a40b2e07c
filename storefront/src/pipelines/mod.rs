// dairy_storefront/src/pipelines/mod.rs

//! Multi-step write operations, each a `milkflow` pipeline keyed by its context type.

use crate::errors::AppError;
use milkflow::Registry;

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod order_status_pipeline;
pub mod payment_pipeline;
pub mod subscription_pipeline;

/// Registers every storefront pipeline. Called once when the application state is built.
pub fn register_all_pipelines(registry: &Registry<AppError>) {
  checkout_pipeline::register_checkout_pipeline(registry);
  order_status_pipeline::register_order_status_pipeline(registry);
  payment_pipeline::register_payment_pipelines(registry);
  subscription_pipeline::register_subscription_pipelines(registry);
  tracing::info!(pipelines = registry.len(), "Storefront pipelines registered.");
}
