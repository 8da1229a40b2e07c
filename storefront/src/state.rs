// dairy_storefront/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::notify::Notifier;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of "now". Every time rule reads it once per request.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self(Mutex::new(start))
  }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.0.lock() = now;
  }

  pub fn advance(&self, by: Duration) {
    let mut guard = self.0.lock();
    *guard += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.0.lock()
  }
}

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub workflows: Arc<milkflow::Registry<AppError>>,
  pub config: Arc<AppConfig>,
  pub clock: Arc<dyn Clock>,
  pub notifier: Arc<dyn Notifier>,
}

impl AppState {
  /// Builds the state and registers every workflow pipeline on a fresh registry.
  pub fn new(
    store: Arc<dyn Store>,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    let workflows = Arc::new(milkflow::Registry::<AppError>::new());
    crate::pipelines::register_all_pipelines(&workflows);
    Self { store, workflows, config, clock, notifier }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  pub fn policy(&self) -> &crate::config::StorePolicy {
    &self.config.policy
  }
}
