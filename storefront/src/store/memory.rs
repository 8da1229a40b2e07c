// dairy_storefront/src/store/memory.rs

//! In-process store. One mutex guards every table so each trait method is a
//! single atomic check-then-apply, matching the transactional `PgStore`.

use super::{OrderFilter, Store, SubscriptionFilter};
use crate::errors::{AppError, Result};
use crate::models::{
  DeliveryPerson, Order, OrderStatus, PaymentSession, PaymentStatus, Product, RefundRequest, RefundStatus,
  SubscriptionPlan, SubscriptionStatus, UserSubscription, VerificationDecision, VerificationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Claim {
  session_id: Uuid,
  expires_at: DateTime<Utc>,
  settled: bool,
}

#[derive(Default)]
struct Inner {
  products: HashMap<Uuid, Product>,
  orders: HashMap<Uuid, Order>,
  sessions: HashMap<Uuid, PaymentSession>,
  claims: HashMap<Uuid, Claim>,
  plans: HashMap<Uuid, SubscriptionPlan>,
  subscriptions: HashMap<Uuid, UserSubscription>,
  refunds: HashMap<Uuid, RefundRequest>,
  delivery_persons: HashMap<Uuid, DeliveryPerson>,
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn newest_first<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
  rows.sort_by(|a, b| key(b).cmp(&key(a)));
  rows
}

fn duplicate(id: Uuid) -> AppError {
  AppError::Internal(format!("Record {} already exists", id))
}

#[async_trait]
impl Store for MemoryStore {
  async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>> {
    let inner = self.inner.lock();
    let mut rows: Vec<Product> =
      inner.products.values().filter(|p| include_inactive || p.is_active).cloned().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(rows)
  }

  async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
    Ok(self.inner.lock().products.get(&id).cloned())
  }

  async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
    let inner = self.inner.lock();
    Ok(ids.iter().filter_map(|id| inner.products.get(id).cloned()).collect())
  }

  async fn insert_product(&self, product: &Product) -> Result<()> {
    let mut inner = self.inner.lock();
    if inner.products.contains_key(&product.id) {
      return Err(duplicate(product.id));
    }
    inner.products.insert(product.id, product.clone());
    Ok(())
  }

  async fn update_product(&self, product: &Product) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.products.get_mut(&product.id) {
      Some(existing) => {
        *existing = product.clone();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn place_order(&self, order: &Order) -> Result<()> {
    let mut inner = self.inner.lock();
    let mut wanted: HashMap<Uuid, i32> = HashMap::new();
    for item in order.items.iter() {
      *wanted.entry(item.product_id).or_default() += item.quantity;
    }
    let mut ids: Vec<Uuid> = wanted.keys().copied().collect();
    ids.sort();
    for id in &ids {
      let qty = wanted[id];
      let available = inner.products.get(id).filter(|p| p.is_active).map(|p| p.stock_quantity);
      if available.map_or(true, |stock| stock < qty) {
        let name = inner.products.get(id).map(|p| p.name.clone()).unwrap_or_else(|| id.to_string());
        return Err(AppError::OutOfStock(format!("Not enough stock for {}", name)));
      }
    }
    for id in &ids {
      if let Some(product) = inner.products.get_mut(id) {
        product.stock_quantity -= wanted[id];
        product.updated_at = order.created_at;
      }
    }
    inner.orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
    Ok(self.inner.lock().orders.get(&id).cloned())
  }

  async fn get_orders(&self, ids: &[Uuid]) -> Result<Vec<Order>> {
    let inner = self.inner.lock();
    Ok(ids.iter().filter_map(|id| inner.orders.get(id).cloned()).collect())
  }

  async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
    let inner = self.inner.lock();
    let rows = inner.orders.values().filter(|o| filter.matches(o)).cloned().collect();
    Ok(newest_first(rows, |o: &Order| o.created_at))
  }

  async fn update_order(&self, order: &Order, restock: bool) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.orders.get(&order.id) {
      Some(stored) if stored.version == order.version => {}
      _ => return Ok(false),
    }
    if restock {
      for item in order.items.iter() {
        if let Some(product) = inner.products.get_mut(&item.product_id) {
          product.stock_quantity += item.quantity;
          product.updated_at = order.updated_at;
        }
      }
    }
    let mut row = order.clone();
    row.version += 1;
    inner.orders.insert(order.id, row);
    Ok(true)
  }

  async fn create_payment_session(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<()> {
    let mut inner = self.inner.lock();
    let targets = session.targets();
    if let Some(held) = targets
      .iter()
      .find(|id| inner.claims.get(*id).map_or(false, |c| c.settled || c.expires_at >= now))
    {
      return Err(AppError::DuplicateSession(format!(
        "A payment session is already open for {}",
        held
      )));
    }
    if inner.sessions.values().any(|s| s.reference_number == session.reference_number) {
      return Err(AppError::DuplicateReference(format!(
        "Reference {} is already in use",
        session.reference_number
      )));
    }
    for id in targets {
      inner
        .claims
        .insert(id, Claim { session_id: session.id, expires_at: session.expires_at, settled: false });
    }
    inner.sessions.insert(session.id, session.clone());
    Ok(())
  }

  async fn get_payment_session(&self, id: Uuid) -> Result<Option<PaymentSession>> {
    Ok(self.inner.lock().sessions.get(&id).cloned())
  }

  async fn list_payment_sessions(&self, status: Option<VerificationStatus>) -> Result<Vec<PaymentSession>> {
    let inner = self.inner.lock();
    let rows = inner
      .sessions
      .values()
      .filter(|s| status.map_or(true, |st| s.verification_status == st))
      .cloned()
      .collect();
    Ok(newest_first(rows, |s: &PaymentSession| s.created_at))
  }

  async fn latest_session_for_subscription(&self, subscription_id: Uuid) -> Result<Option<PaymentSession>> {
    let inner = self.inner.lock();
    Ok(
      inner
        .sessions
        .values()
        .filter(|s| s.subscription_id == Some(subscription_id))
        .max_by_key(|s| s.created_at)
        .cloned(),
    )
  }

  async fn record_submission(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<bool> {
    let mut inner = self.inner.lock();
    let open = inner.sessions.get(&session.id).map_or(false, |s| {
      !s.verification_status.is_final() && s.expires_at >= now
    });
    if !open {
      return Ok(false);
    }
    for id in &session.order_ids {
      if let Some(order) = inner.orders.get_mut(id) {
        if matches!(order.payment_status, PaymentStatus::Pending | PaymentStatus::Failed) {
          order.payment_status = PaymentStatus::Processing;
          order.updated_at = now;
          order.version += 1;
        }
      }
    }
    if let Some(sub) = session.subscription_id.and_then(|id| inner.subscriptions.get_mut(&id)) {
      if sub.status == SubscriptionStatus::Pending {
        sub.status = SubscriptionStatus::Processing;
        sub.updated_at = now;
        sub.version += 1;
      }
    }
    inner.sessions.insert(session.id, session.clone());
    Ok(true)
  }

  async fn settle_payment(
    &self,
    session: &PaymentSession,
    decision: VerificationDecision,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    let mut inner = self.inner.lock();
    let live = inner.sessions.get(&session.id).map_or(false, |s| {
      s.verification_status == VerificationStatus::Submitted && s.expires_at >= now
    });
    if !live {
      return Ok(false);
    }
    let targets = session.targets();
    match decision {
      VerificationDecision::Approve => {
        for id in &targets {
          if let Some(claim) = inner.claims.get_mut(id) {
            claim.settled = true;
          }
        }
        for id in &session.order_ids {
          if let Some(order) = inner.orders.get_mut(id) {
            order.payment_status = PaymentStatus::Paid;
            if order.status == OrderStatus::Pending {
              order.status = OrderStatus::Confirmed;
              order.confirmed_at = Some(now);
            }
            order.updated_at = now;
            order.version += 1;
          }
        }
        if let Some(sub) = session.subscription_id.and_then(|id| inner.subscriptions.get_mut(&id)) {
          sub.payment_status = PaymentStatus::Paid;
          sub.payment_id = Some(session.id);
          if matches!(sub.status, SubscriptionStatus::Pending | SubscriptionStatus::Processing) {
            sub.status = SubscriptionStatus::Active;
          }
          sub.updated_at = now;
          sub.version += 1;
        }
      }
      VerificationDecision::Reject => {
        for id in &targets {
          if inner.claims.get(id).map_or(false, |c| c.session_id == session.id) {
            inner.claims.remove(id);
          }
        }
        for id in &session.order_ids {
          if let Some(order) = inner.orders.get_mut(id) {
            if !order.payment_status.is_settled() {
              order.payment_status = PaymentStatus::Failed;
              order.updated_at = now;
              order.version += 1;
            }
          }
        }
        if let Some(sub) = session.subscription_id.and_then(|id| inner.subscriptions.get_mut(&id)) {
          if !sub.payment_status.is_settled() {
            sub.payment_status = PaymentStatus::Failed;
          }
          if sub.status == SubscriptionStatus::Processing {
            sub.status = SubscriptionStatus::Pending;
          }
          sub.updated_at = now;
          sub.version += 1;
        }
      }
    }
    inner.sessions.insert(session.id, session.clone());
    Ok(true)
  }

  async fn insert_plan(&self, plan: &SubscriptionPlan) -> Result<()> {
    let mut inner = self.inner.lock();
    if inner.plans.contains_key(&plan.id) {
      return Err(duplicate(plan.id));
    }
    inner.plans.insert(plan.id, plan.clone());
    Ok(())
  }

  async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.plans.get_mut(&plan.id) {
      Some(existing) => {
        *existing = plan.clone();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn get_plan(&self, id: Uuid) -> Result<Option<SubscriptionPlan>> {
    Ok(self.inner.lock().plans.get(&id).cloned())
  }

  async fn list_plans(&self, include_inactive: bool) -> Result<Vec<SubscriptionPlan>> {
    let inner = self.inner.lock();
    let mut rows: Vec<SubscriptionPlan> =
      inner.plans.values().filter(|p| include_inactive || p.is_active).cloned().collect();
    rows.sort_by(|a, b| a.duration_days.cmp(&b.duration_days).then_with(|| a.name.cmp(&b.name)));
    Ok(rows)
  }

  async fn insert_subscription(&self, sub: &UserSubscription) -> Result<()> {
    let mut inner = self.inner.lock();
    if inner.subscriptions.contains_key(&sub.id) {
      return Err(duplicate(sub.id));
    }
    inner.subscriptions.insert(sub.id, sub.clone());
    Ok(())
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<UserSubscription>> {
    Ok(self.inner.lock().subscriptions.get(&id).cloned())
  }

  async fn list_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<UserSubscription>> {
    let inner = self.inner.lock();
    let rows = inner.subscriptions.values().filter(|s| filter.matches(s)).cloned().collect();
    Ok(newest_first(rows, |s: &UserSubscription| s.created_at))
  }

  async fn update_subscription(&self, sub: &UserSubscription) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.subscriptions.get_mut(&sub.id) {
      Some(stored) if stored.version == sub.version => {
        *stored = sub.clone();
        stored.version += 1;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn insert_refund(&self, refund: &RefundRequest) -> Result<()> {
    let mut inner = self.inner.lock();
    let target = refund.order_id.or(refund.subscription_id);
    let open = inner
      .refunds
      .values()
      .any(|r| r.status.is_open() && r.order_id.or(r.subscription_id) == target);
    if open {
      return Err(AppError::AlreadyProcessed(
        "A refund request is already open for this purchase".to_string(),
      ));
    }
    inner.refunds.insert(refund.id, refund.clone());
    Ok(())
  }

  async fn get_refund(&self, id: Uuid) -> Result<Option<RefundRequest>> {
    Ok(self.inner.lock().refunds.get(&id).cloned())
  }

  async fn list_refunds(&self, user_id: Option<Uuid>) -> Result<Vec<RefundRequest>> {
    let inner = self.inner.lock();
    let rows = inner
      .refunds
      .values()
      .filter(|r| user_id.map_or(true, |id| r.user_id == id))
      .cloned()
      .collect();
    Ok(newest_first(rows, |r: &RefundRequest| r.created_at))
  }

  async fn resolve_refund(&self, refund: &RefundRequest, expected: RefundStatus) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.refunds.get(&refund.id) {
      Some(stored) if stored.status == expected => {}
      _ => return Ok(false),
    }
    if refund.status == RefundStatus::Processed {
      if let Some(order) = refund.order_id.and_then(|id| inner.orders.get_mut(&id)) {
        order.payment_status = PaymentStatus::Refunded;
        order.updated_at = refund.updated_at;
        order.version += 1;
      }
      if let Some(sub) = refund.subscription_id.and_then(|id| inner.subscriptions.get_mut(&id)) {
        sub.payment_status = PaymentStatus::Refunded;
        sub.updated_at = refund.updated_at;
        sub.version += 1;
      }
    }
    inner.refunds.insert(refund.id, refund.clone());
    Ok(true)
  }

  async fn insert_delivery_person(&self, person: &DeliveryPerson) -> Result<()> {
    let mut inner = self.inner.lock();
    if inner.delivery_persons.contains_key(&person.id) {
      return Err(AppError::AlreadyProcessed(format!("Delivery person {} is already registered", person.id)));
    }
    inner.delivery_persons.insert(person.id, person.clone());
    Ok(())
  }

  async fn get_delivery_person(&self, id: Uuid) -> Result<Option<DeliveryPerson>> {
    Ok(self.inner.lock().delivery_persons.get(&id).cloned())
  }

  async fn list_delivery_persons(&self) -> Result<Vec<DeliveryPerson>> {
    let inner = self.inner.lock();
    let rows = inner.delivery_persons.values().cloned().collect();
    Ok(newest_first(rows, |p: &DeliveryPerson| p.created_at))
  }

  async fn update_delivery_person(&self, person: &DeliveryPerson) -> Result<bool> {
    let mut inner = self.inner.lock();
    match inner.delivery_persons.get_mut(&person.id) {
      Some(existing) => {
        *existing = person.clone();
        Ok(true)
      }
      None => Ok(false),
    }
  }
}
