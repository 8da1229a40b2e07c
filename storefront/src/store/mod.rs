// dairy_storefront/src/store/mod.rs

//! Persistence boundary.
//!
//! Every method that must be atomic (stock decrement with order insert, order
//! claims with session insert, conditional state writes, payment cascades) is a
//! single call here, and each implementation runs it atomically: `PgStore` in a
//! transaction with guarded updates, `MemoryStore` under one lock.
//!
//! Conditional writes return `Ok(false)` when the stored record no longer has the
//! expected state; callers turn that into an `IllegalTransition`.

pub mod memory;
pub mod postgres;

use crate::errors::Result;
use crate::models::{
  DeliveryPerson, Order, OrderStatus, PaymentSession, Product, RefundRequest, RefundStatus, SubscriptionPlan,
  SubscriptionStatus, UserSubscription, VerificationDecision, VerificationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
  pub user_id: Option<Uuid>,
  pub status: Option<OrderStatus>,
  pub delivery_person_id: Option<Uuid>,
}

impl OrderFilter {
  pub fn matches(&self, order: &Order) -> bool {
    self.user_id.map_or(true, |id| order.user_id == id)
      && self.status.map_or(true, |s| order.status == s)
      && self.delivery_person_id.map_or(true, |id| order.delivery_person_id == Some(id))
  }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
  pub user_id: Option<Uuid>,
  /// Empty means any status.
  pub statuses: Vec<SubscriptionStatus>,
}

impl SubscriptionFilter {
  pub fn matches(&self, sub: &UserSubscription) -> bool {
    self.user_id.map_or(true, |id| sub.user_id == id) && (self.statuses.is_empty() || self.statuses.contains(&sub.status))
  }
}

#[async_trait]
pub trait Store: Send + Sync {
  // --- Catalog ---
  async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>>;
  async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
  async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
  async fn insert_product(&self, product: &Product) -> Result<()>;
  async fn update_product(&self, product: &Product) -> Result<bool>;

  // --- Orders ---
  /// Decrements stock for every line and inserts the order, or does neither.
  /// Fails with `OutOfStock` naming the first short product.
  async fn place_order(&self, order: &Order) -> Result<()>;
  async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
  async fn get_orders(&self, ids: &[Uuid]) -> Result<Vec<Order>>;
  async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
  /// Overwrites the order if the stored row is still at `order.version`, and
  /// bumps the version. With `restock`, line quantities go back to the catalog
  /// in the same write.
  async fn update_order(&self, order: &Order, restock: bool) -> Result<bool>;

  // --- Payment sessions ---
  /// Claims every target of the session and inserts it. Claims held by an
  /// expired, unsettled session are reclaimed. Any live claim fails the whole
  /// call with `DuplicateSession`; a reference number already in use fails it
  /// with `DuplicateReference`.
  async fn create_payment_session(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<()>;
  async fn get_payment_session(&self, id: Uuid) -> Result<Option<PaymentSession>>;
  async fn list_payment_sessions(&self, status: Option<VerificationStatus>) -> Result<Vec<PaymentSession>>;
  async fn latest_session_for_subscription(&self, subscription_id: Uuid) -> Result<Option<PaymentSession>>;
  /// Stores the buyer's submission if the session is still open and unexpired,
  /// and marks covered targets as processing.
  async fn record_submission(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<bool>;
  /// Stores the admin decision if the session is still submitted and unexpired,
  /// then cascades it to covered orders and subscriptions and settles or releases the claims.
  async fn settle_payment(
    &self,
    session: &PaymentSession,
    decision: VerificationDecision,
    now: DateTime<Utc>,
  ) -> Result<bool>;

  // --- Subscriptions ---
  async fn insert_plan(&self, plan: &SubscriptionPlan) -> Result<()>;
  async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<bool>;
  async fn get_plan(&self, id: Uuid) -> Result<Option<SubscriptionPlan>>;
  async fn list_plans(&self, include_inactive: bool) -> Result<Vec<SubscriptionPlan>>;
  async fn insert_subscription(&self, sub: &UserSubscription) -> Result<()>;
  async fn get_subscription(&self, id: Uuid) -> Result<Option<UserSubscription>>;
  async fn list_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<UserSubscription>>;
  /// Same version check as `update_order`.
  async fn update_subscription(&self, sub: &UserSubscription) -> Result<bool>;

  // --- Refunds ---
  /// Fails with `AlreadyProcessed` when the target already has an open request.
  async fn insert_refund(&self, refund: &RefundRequest) -> Result<()>;
  async fn get_refund(&self, id: Uuid) -> Result<Option<RefundRequest>>;
  async fn list_refunds(&self, user_id: Option<Uuid>) -> Result<Vec<RefundRequest>>;
  /// Conditional on `expected`. Moving to `processed` marks the target refunded.
  async fn resolve_refund(&self, refund: &RefundRequest, expected: RefundStatus) -> Result<bool>;

  // --- Delivery personnel ---
  async fn insert_delivery_person(&self, person: &DeliveryPerson) -> Result<()>;
  async fn get_delivery_person(&self, id: Uuid) -> Result<Option<DeliveryPerson>>;
  async fn list_delivery_persons(&self) -> Result<Vec<DeliveryPerson>>;
  async fn update_delivery_person(&self, person: &DeliveryPerson) -> Result<bool>;
}
