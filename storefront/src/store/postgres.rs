// dairy_storefront/src/store/postgres.rs

//! Postgres-backed store. Multi-row changes run in one transaction; state
//! changes are guarded `UPDATE ... WHERE status = $expected` or
//! `WHERE version = $loaded` statements whose affected-row count tells the
//! caller whether it won. Every write to an order or subscription bumps its
//! version, cascades included.

use super::{OrderFilter, Store, SubscriptionFilter};
use crate::errors::{AppError, Result};
use crate::models::{
  DeliveryPerson, Order, PaymentSession, PaymentStatus, Product, RefundRequest, RefundStatus, SubscriptionPlan,
  UserSubscription, VerificationDecision, VerificationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str =
  "id, name, description, category, unit, price_paise, stock_quantity, is_active, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, items, shipping_address, subtotal_paise, shipping_fee_paise, tax_paise, \
  discount_paise, total_amount_paise, delivery_shift, delivery_date, status, payment_status, payment_method, notes, \
  cancellation_reason, cancelled_by, delivery_person_id, created_at, confirmed_at, delivered_at, cancelled_at, \
  updated_at, version";

const SESSION_COLUMNS: &str = "id, reference_number, user_id, order_ids, subscription_id, total_amount_paise, upi_id, \
  upi_name, qr_payload, expires_at, verification_status, upi_transaction_id, upi_reference_number, submitted_at, \
  verified_at, verified_by, rejection_reason, created_at";

const PLAN_COLUMNS: &str = "id, name, milk_type, volume, duration_days, price_paise, original_price_paise, \
  daily_price_paise, discount_percent, features, is_active, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, plan_name, price_paise, start_date, end_date, \
  next_delivery_date, total_deliveries, completed_deliveries, skipped_deliveries, status, payment_status, \
  delivery_address, preferred_delivery_time, payment_id, cancellation_reason, paused_at, created_at, updated_at, \
  version";

const REFUND_COLUMNS: &str = "id, user_id, order_id, subscription_id, amount_paise, reason, refund_details, status, \
  admin_notes, resolved_by, resolved_at, created_at, updated_at";

const DELIVERY_PERSON_COLUMNS: &str = "id, name, phone, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(name = "PgStore::connect", skip(database_url))]
  pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
    info!("Database connection pool established.");
    Ok(Self::new(pool))
  }

  pub async fn run_migrations(&self) -> Result<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| AppError::Internal(format!("Database migration failed: {}", e)))?;
    info!("Database migrations applied.");
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  async fn write_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE orders SET status = $2, payment_status = $3, notes = $4, cancellation_reason = $5, cancelled_by = $6, \
       delivery_person_id = $7, confirmed_at = $8, delivered_at = $9, cancelled_at = $10, updated_at = $11, \
       version = version + 1 WHERE id = $1 AND version = $12",
    )
    .bind(order.id)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(&order.notes)
    .bind(&order.cancellation_reason)
    .bind(order.cancelled_by)
    .bind(order.delivery_person_id)
    .bind(order.confirmed_at)
    .bind(order.delivered_at)
    .bind(order.cancelled_at)
    .bind(order.updated_at)
    .bind(order.version)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn write_session(tx: &mut Transaction<'_, Postgres>, session: &PaymentSession) -> Result<()> {
    sqlx::query(
      "UPDATE payment_sessions SET verification_status = $2, upi_transaction_id = $3, upi_reference_number = $4, \
       submitted_at = $5, verified_at = $6, verified_by = $7, rejection_reason = $8 WHERE id = $1",
    )
    .bind(session.id)
    .bind(session.verification_status)
    .bind(&session.upi_transaction_id)
    .bind(&session.upi_reference_number)
    .bind(session.submitted_at)
    .bind(session.verified_at)
    .bind(session.verified_by)
    .bind(&session.rejection_reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
  }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
  err.as_database_error().map_or(false, |db| db.is_unique_violation())
}

const SESSION_REFERENCE_CONSTRAINT: &str = "payment_sessions_reference_number_key";

fn is_reference_collision(err: &sqlx::Error) -> bool {
  err
    .as_database_error()
    .and_then(|db| db.constraint())
    .map_or(false, |name| name == SESSION_REFERENCE_CONSTRAINT)
}

#[async_trait]
impl Store for PgStore {
  async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>> {
    let sql = format!(
      "SELECT {} FROM products WHERE is_active OR $1 ORDER BY name",
      PRODUCT_COLUMNS
    );
    Ok(sqlx::query_as::<_, Product>(&sql).bind(include_inactive).fetch_all(&self.pool).await?)
  }

  async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
    Ok(sqlx::query_as::<_, Product>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS);
    Ok(sqlx::query_as::<_, Product>(&sql).bind(ids).fetch_all(&self.pool).await?)
  }

  async fn insert_product(&self, p: &Product) -> Result<()> {
    sqlx::query(
      "INSERT INTO products (id, name, description, category, unit, price_paise, stock_quantity, is_active, \
       created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(p.id)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.category)
    .bind(&p.unit)
    .bind(p.price_paise)
    .bind(p.stock_quantity)
    .bind(p.is_active)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn update_product(&self, p: &Product) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE products SET name = $2, description = $3, category = $4, unit = $5, price_paise = $6, \
       stock_quantity = $7, is_active = $8, updated_at = $9 WHERE id = $1",
    )
    .bind(p.id)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.category)
    .bind(&p.unit)
    .bind(p.price_paise)
    .bind(p.stock_quantity)
    .bind(p.is_active)
    .bind(p.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(name = "PgStore::place_order", skip(self, order), fields(order_id = %order.id))]
  async fn place_order(&self, order: &Order) -> Result<()> {
    // Sorted by product id so concurrent checkouts lock rows in the same order.
    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in order.items.iter() {
      *wanted.entry(item.product_id).or_default() += item.quantity;
    }

    let mut tx = self.pool.begin().await?;
    for (product_id, quantity) in &wanted {
      let result = sqlx::query(
        "UPDATE products SET stock_quantity = stock_quantity - $1, updated_at = $3 \
         WHERE id = $2 AND is_active AND stock_quantity >= $1",
      )
      .bind(quantity)
      .bind(product_id)
      .bind(order.created_at)
      .execute(&mut *tx)
      .await?;
      if result.rows_affected() != 1 {
        let name = order
          .items
          .iter()
          .find(|i| i.product_id == *product_id)
          .map(|i| i.name.clone())
          .unwrap_or_else(|| product_id.to_string());
        debug!(%product_id, "Stock decrement lost; rolling back.");
        tx.rollback().await?;
        return Err(AppError::OutOfStock(format!("Not enough stock for {}", name)));
      }
    }

    sqlx::query(
      "INSERT INTO orders (id, user_id, items, shipping_address, subtotal_paise, shipping_fee_paise, tax_paise, \
       discount_paise, total_amount_paise, delivery_shift, delivery_date, status, payment_status, payment_method, \
       notes, cancellation_reason, cancelled_by, delivery_person_id, created_at, confirmed_at, delivered_at, \
       cancelled_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.items)
    .bind(&order.shipping_address)
    .bind(order.subtotal_paise)
    .bind(order.shipping_fee_paise)
    .bind(order.tax_paise)
    .bind(order.discount_paise)
    .bind(order.total_amount_paise)
    .bind(order.delivery_shift)
    .bind(order.delivery_date)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.payment_method)
    .bind(&order.notes)
    .bind(&order.cancellation_reason)
    .bind(order.cancelled_by)
    .bind(order.delivery_person_id)
    .bind(order.created_at)
    .bind(order.confirmed_at)
    .bind(order.delivered_at)
    .bind(order.cancelled_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
    Ok(sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn get_orders(&self, ids: &[Uuid]) -> Result<Vec<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = ANY($1)", ORDER_COLUMNS);
    Ok(sqlx::query_as::<_, Order>(&sql).bind(ids).fetch_all(&self.pool).await?)
  }

  async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
    let sql = format!(
      "SELECT {} FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::order_status_enum IS NULL OR status = $2) \
       AND ($3::uuid IS NULL OR delivery_person_id = $3) ORDER BY created_at DESC",
      ORDER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Order>(&sql)
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(filter.delivery_person_id)
        .fetch_all(&self.pool)
        .await?,
    )
  }

  #[instrument(name = "PgStore::update_order", skip(self, order), fields(order_id = %order.id))]
  async fn update_order(&self, order: &Order, restock: bool) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    if !Self::write_order(&mut tx, order).await? {
      tx.rollback().await?;
      return Ok(false);
    }
    if restock {
      for item in order.items.iter() {
        sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = $3 WHERE id = $2")
          .bind(item.quantity)
          .bind(item.product_id)
          .bind(order.updated_at)
          .execute(&mut *tx)
          .await?;
      }
    }
    tx.commit().await?;
    Ok(true)
  }

  #[instrument(name = "PgStore::create_payment_session", skip(self, session), fields(session_id = %session.id))]
  async fn create_payment_session(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<()> {
    let targets = session.targets();
    let mut tx = self.pool.begin().await?;

    sqlx::query("DELETE FROM payment_claims WHERE target_id = ANY($1) AND NOT settled AND expires_at < $2")
      .bind(&targets)
      .bind(now)
      .execute(&mut *tx)
      .await?;

    let inserted = sqlx::query(
      "INSERT INTO payment_sessions (id, reference_number, user_id, order_ids, subscription_id, total_amount_paise, \
       upi_id, upi_name, qr_payload, expires_at, verification_status, upi_transaction_id, upi_reference_number, \
       submitted_at, verified_at, verified_by, rejection_reason, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(session.id)
    .bind(&session.reference_number)
    .bind(session.user_id)
    .bind(&session.order_ids)
    .bind(session.subscription_id)
    .bind(session.total_amount_paise)
    .bind(&session.upi_id)
    .bind(&session.upi_name)
    .bind(&session.qr_payload)
    .bind(session.expires_at)
    .bind(session.verification_status)
    .bind(&session.upi_transaction_id)
    .bind(&session.upi_reference_number)
    .bind(session.submitted_at)
    .bind(session.verified_at)
    .bind(session.verified_by)
    .bind(&session.rejection_reason)
    .bind(session.created_at)
    .execute(&mut *tx)
    .await;
    if let Err(e) = inserted {
      tx.rollback().await?;
      if is_reference_collision(&e) {
        return Err(AppError::DuplicateReference(format!(
          "Reference {} is already in use",
          session.reference_number
        )));
      }
      return Err(e.into());
    }

    let claimed = sqlx::query(
      "INSERT INTO payment_claims (target_id, session_id, expires_at) \
       SELECT target, $2, $3 FROM UNNEST($1::uuid[]) AS target ON CONFLICT (target_id) DO NOTHING",
    )
    .bind(&targets)
    .bind(session.id)
    .bind(session.expires_at)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed != targets.len() as u64 {
      warn!(claimed, wanted = targets.len(), "Payment target already claimed; rolling back.");
      tx.rollback().await?;
      return Err(AppError::DuplicateSession(
        "A payment session is already open for one of these items".to_string(),
      ));
    }
    tx.commit().await?;
    Ok(())
  }

  async fn get_payment_session(&self, id: Uuid) -> Result<Option<PaymentSession>> {
    let sql = format!("SELECT {} FROM payment_sessions WHERE id = $1", SESSION_COLUMNS);
    Ok(sqlx::query_as::<_, PaymentSession>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn list_payment_sessions(&self, status: Option<VerificationStatus>) -> Result<Vec<PaymentSession>> {
    let sql = format!(
      "SELECT {} FROM payment_sessions WHERE ($1::verification_status_enum IS NULL OR verification_status = $1) \
       ORDER BY created_at DESC",
      SESSION_COLUMNS
    );
    Ok(sqlx::query_as::<_, PaymentSession>(&sql).bind(status).fetch_all(&self.pool).await?)
  }

  async fn latest_session_for_subscription(&self, subscription_id: Uuid) -> Result<Option<PaymentSession>> {
    let sql = format!(
      "SELECT {} FROM payment_sessions WHERE subscription_id = $1 ORDER BY created_at DESC LIMIT 1",
      SESSION_COLUMNS
    );
    Ok(sqlx::query_as::<_, PaymentSession>(&sql).bind(subscription_id).fetch_optional(&self.pool).await?)
  }

  #[instrument(name = "PgStore::record_submission", skip(self, session), fields(session_id = %session.id))]
  async fn record_submission(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let open = sqlx::query(
      "SELECT 1 FROM payment_sessions WHERE id = $1 AND verification_status IN ('awaiting_submission', 'submitted') \
       AND expires_at >= $2 FOR UPDATE",
    )
    .bind(session.id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .is_some();
    if !open {
      tx.rollback().await?;
      return Ok(false);
    }
    Self::write_session(&mut tx, session).await?;
    sqlx::query(
      "UPDATE orders SET payment_status = 'processing', updated_at = $2, version = version + 1 \
       WHERE id = ANY($1) AND payment_status IN ('pending', 'failed')",
    )
    .bind(&session.order_ids)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    if let Some(sub_id) = session.subscription_id {
      sqlx::query("UPDATE user_subscriptions SET status = 'processing', updated_at = $2, version = version + 1 \
         WHERE id = $1 AND status = 'pending'")
        .bind(sub_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(true)
  }

  #[instrument(name = "PgStore::settle_payment", skip(self, session), fields(session_id = %session.id, decision = ?decision))]
  async fn settle_payment(
    &self,
    session: &PaymentSession,
    decision: VerificationDecision,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let live = sqlx::query(
      "SELECT 1 FROM payment_sessions WHERE id = $1 AND verification_status = 'submitted' AND expires_at >= $2 FOR UPDATE",
    )
    .bind(session.id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .is_some();
    if !live {
      tx.rollback().await?;
      return Ok(false);
    }
    Self::write_session(&mut tx, session).await?;

    match decision {
      VerificationDecision::Approve => {
        sqlx::query("UPDATE payment_claims SET settled = TRUE WHERE session_id = $1")
          .bind(session.id)
          .execute(&mut *tx)
          .await?;
        sqlx::query(
          "UPDATE orders SET payment_status = 'paid', \
           confirmed_at = CASE WHEN status = 'pending' THEN $2 ELSE confirmed_at END, \
           status = CASE WHEN status = 'pending' THEN 'confirmed'::order_status_enum ELSE status END, \
           updated_at = $2, version = version + 1 WHERE id = ANY($1)",
        )
        .bind(&session.order_ids)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if let Some(sub_id) = session.subscription_id {
          sqlx::query(
            "UPDATE user_subscriptions SET payment_status = 'paid', payment_id = $2, \
             status = CASE WHEN status IN ('pending', 'processing') THEN 'active'::subscription_status_enum ELSE status END, \
             updated_at = $3, version = version + 1 WHERE id = $1",
          )
          .bind(sub_id)
          .bind(session.id)
          .bind(now)
          .execute(&mut *tx)
          .await?;
        }
      }
      VerificationDecision::Reject => {
        sqlx::query("DELETE FROM payment_claims WHERE session_id = $1")
          .bind(session.id)
          .execute(&mut *tx)
          .await?;
        sqlx::query(
          "UPDATE orders SET payment_status = 'failed', updated_at = $2, version = version + 1 \
           WHERE id = ANY($1) AND payment_status NOT IN ('paid', 'refunded')",
        )
        .bind(&session.order_ids)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if let Some(sub_id) = session.subscription_id {
          sqlx::query(
            "UPDATE user_subscriptions SET \
             payment_status = CASE WHEN payment_status IN ('paid', 'refunded') THEN payment_status \
               ELSE 'failed'::payment_status_enum END, \
             status = CASE WHEN status = 'processing' THEN 'pending'::subscription_status_enum ELSE status END, \
             updated_at = $2, version = version + 1 WHERE id = $1",
          )
          .bind(sub_id)
          .bind(now)
          .execute(&mut *tx)
          .await?;
        }
      }
    }
    tx.commit().await?;
    Ok(true)
  }

  async fn insert_plan(&self, plan: &SubscriptionPlan) -> Result<()> {
    sqlx::query(
      "INSERT INTO subscription_plans (id, name, milk_type, volume, duration_days, price_paise, original_price_paise, \
       daily_price_paise, discount_percent, features, is_active, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(plan.id)
    .bind(&plan.name)
    .bind(plan.milk_type)
    .bind(&plan.volume)
    .bind(plan.duration_days)
    .bind(plan.price_paise)
    .bind(plan.original_price_paise)
    .bind(plan.daily_price_paise)
    .bind(plan.discount_percent)
    .bind(&plan.features)
    .bind(plan.is_active)
    .bind(plan.created_at)
    .bind(plan.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE subscription_plans SET name = $2, milk_type = $3, volume = $4, duration_days = $5, price_paise = $6, \
       original_price_paise = $7, daily_price_paise = $8, discount_percent = $9, features = $10, is_active = $11, \
       updated_at = $12 WHERE id = $1",
    )
    .bind(plan.id)
    .bind(&plan.name)
    .bind(plan.milk_type)
    .bind(&plan.volume)
    .bind(plan.duration_days)
    .bind(plan.price_paise)
    .bind(plan.original_price_paise)
    .bind(plan.daily_price_paise)
    .bind(plan.discount_percent)
    .bind(&plan.features)
    .bind(plan.is_active)
    .bind(plan.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn get_plan(&self, id: Uuid) -> Result<Option<SubscriptionPlan>> {
    let sql = format!("SELECT {} FROM subscription_plans WHERE id = $1", PLAN_COLUMNS);
    Ok(sqlx::query_as::<_, SubscriptionPlan>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn list_plans(&self, include_inactive: bool) -> Result<Vec<SubscriptionPlan>> {
    let sql = format!(
      "SELECT {} FROM subscription_plans WHERE is_active OR $1 ORDER BY duration_days, name",
      PLAN_COLUMNS
    );
    Ok(sqlx::query_as::<_, SubscriptionPlan>(&sql).bind(include_inactive).fetch_all(&self.pool).await?)
  }

  async fn insert_subscription(&self, sub: &UserSubscription) -> Result<()> {
    sqlx::query(
      "INSERT INTO user_subscriptions (id, user_id, plan_id, plan_name, price_paise, start_date, end_date, \
       next_delivery_date, total_deliveries, completed_deliveries, skipped_deliveries, status, payment_status, \
       delivery_address, preferred_delivery_time, payment_id, cancellation_reason, paused_at, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
    )
    .bind(sub.id)
    .bind(sub.user_id)
    .bind(sub.plan_id)
    .bind(&sub.plan_name)
    .bind(sub.price_paise)
    .bind(sub.start_date)
    .bind(sub.end_date)
    .bind(sub.next_delivery_date)
    .bind(sub.total_deliveries)
    .bind(sub.completed_deliveries)
    .bind(sub.skipped_deliveries)
    .bind(sub.status)
    .bind(sub.payment_status)
    .bind(&sub.delivery_address)
    .bind(sub.preferred_delivery_time)
    .bind(sub.payment_id)
    .bind(&sub.cancellation_reason)
    .bind(sub.paused_at)
    .bind(sub.created_at)
    .bind(sub.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<UserSubscription>> {
    let sql = format!("SELECT {} FROM user_subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
    Ok(sqlx::query_as::<_, UserSubscription>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn list_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<UserSubscription>> {
    let sql = format!(
      "SELECT {} FROM user_subscriptions WHERE ($1::uuid IS NULL OR user_id = $1) \
       AND (cardinality($2::subscription_status_enum[]) = 0 OR status = ANY($2)) ORDER BY created_at DESC",
      SUBSCRIPTION_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, UserSubscription>(&sql)
        .bind(filter.user_id)
        .bind(&filter.statuses)
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn update_subscription(&self, sub: &UserSubscription) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE user_subscriptions SET end_date = $2, next_delivery_date = $3, completed_deliveries = $4, \
       skipped_deliveries = $5, status = $6, payment_status = $7, payment_id = $8, cancellation_reason = $9, \
       paused_at = $10, updated_at = $11, version = version + 1 WHERE id = $1 AND version = $12",
    )
    .bind(sub.id)
    .bind(sub.end_date)
    .bind(sub.next_delivery_date)
    .bind(sub.completed_deliveries)
    .bind(sub.skipped_deliveries)
    .bind(sub.status)
    .bind(sub.payment_status)
    .bind(sub.payment_id)
    .bind(&sub.cancellation_reason)
    .bind(sub.paused_at)
    .bind(sub.updated_at)
    .bind(sub.version)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn insert_refund(&self, refund: &RefundRequest) -> Result<()> {
    let result = sqlx::query(
      "INSERT INTO refund_requests (id, user_id, order_id, subscription_id, amount_paise, reason, refund_details, \
       status, admin_notes, resolved_by, resolved_at, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(refund.id)
    .bind(refund.user_id)
    .bind(refund.order_id)
    .bind(refund.subscription_id)
    .bind(refund.amount_paise)
    .bind(&refund.reason)
    .bind(&refund.refund_details)
    .bind(refund.status)
    .bind(&refund.admin_notes)
    .bind(refund.resolved_by)
    .bind(refund.resolved_at)
    .bind(refund.created_at)
    .bind(refund.updated_at)
    .execute(&self.pool)
    .await;
    match result {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => Err(AppError::AlreadyProcessed(
        "A refund request is already open for this purchase".to_string(),
      )),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_refund(&self, id: Uuid) -> Result<Option<RefundRequest>> {
    let sql = format!("SELECT {} FROM refund_requests WHERE id = $1", REFUND_COLUMNS);
    Ok(sqlx::query_as::<_, RefundRequest>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn list_refunds(&self, user_id: Option<Uuid>) -> Result<Vec<RefundRequest>> {
    let sql = format!(
      "SELECT {} FROM refund_requests WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
      REFUND_COLUMNS
    );
    Ok(sqlx::query_as::<_, RefundRequest>(&sql).bind(user_id).fetch_all(&self.pool).await?)
  }

  #[instrument(name = "PgStore::resolve_refund", skip(self, refund), fields(refund_id = %refund.id))]
  async fn resolve_refund(&self, refund: &RefundRequest, expected: RefundStatus) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let result = sqlx::query(
      "UPDATE refund_requests SET status = $2, admin_notes = $3, resolved_by = $4, resolved_at = $5, updated_at = $6 \
       WHERE id = $1 AND status = $7",
    )
    .bind(refund.id)
    .bind(refund.status)
    .bind(&refund.admin_notes)
    .bind(refund.resolved_by)
    .bind(refund.resolved_at)
    .bind(refund.updated_at)
    .bind(expected)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() != 1 {
      tx.rollback().await?;
      return Ok(false);
    }
    if refund.status == RefundStatus::Processed {
      if let Some(order_id) = refund.order_id {
        sqlx::query("UPDATE orders SET payment_status = $2, updated_at = $3, version = version + 1 WHERE id = $1")
          .bind(order_id)
          .bind(PaymentStatus::Refunded)
          .bind(refund.updated_at)
          .execute(&mut *tx)
          .await?;
      }
      if let Some(sub_id) = refund.subscription_id {
        sqlx::query("UPDATE user_subscriptions SET payment_status = $2, updated_at = $3, version = version + 1 \
           WHERE id = $1")
          .bind(sub_id)
          .bind(PaymentStatus::Refunded)
          .bind(refund.updated_at)
          .execute(&mut *tx)
          .await?;
      }
    }
    tx.commit().await?;
    Ok(true)
  }

  async fn insert_delivery_person(&self, person: &DeliveryPerson) -> Result<()> {
    let result = sqlx::query(
      "INSERT INTO delivery_persons (id, name, phone, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(person.id)
    .bind(&person.name)
    .bind(&person.phone)
    .bind(person.status)
    .bind(person.created_at)
    .bind(person.updated_at)
    .execute(&self.pool)
    .await;
    match result {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => Err(AppError::AlreadyProcessed(format!(
        "Delivery person {} is already registered",
        person.id
      ))),
      Err(e) => Err(e.into()),
    }
  }

  async fn get_delivery_person(&self, id: Uuid) -> Result<Option<DeliveryPerson>> {
    let sql = format!("SELECT {} FROM delivery_persons WHERE id = $1", DELIVERY_PERSON_COLUMNS);
    Ok(sqlx::query_as::<_, DeliveryPerson>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn list_delivery_persons(&self) -> Result<Vec<DeliveryPerson>> {
    let sql = format!("SELECT {} FROM delivery_persons ORDER BY created_at DESC", DELIVERY_PERSON_COLUMNS);
    Ok(sqlx::query_as::<_, DeliveryPerson>(&sql).fetch_all(&self.pool).await?)
  }

  async fn update_delivery_person(&self, person: &DeliveryPerson) -> Result<bool> {
    let result = sqlx::query("UPDATE delivery_persons SET name = $2, phone = $3, status = $4, updated_at = $5 WHERE id = $1")
      .bind(person.id)
      .bind(&person.name)
      .bind(&person.phone)
      .bind(person.status)
      .bind(person.updated_at)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() == 1)
  }
}
