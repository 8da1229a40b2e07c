// dairy_storefront/src/pipelines/contexts.rs

//! Root context structs for every pipeline, plus the typed inputs handlers fill in.
//! Handlers receive these wrapped in `milkflow::ContextData`.

use crate::models::subscription::DeliveryOutcome;
use crate::models::{
  DeliveryShift, LineItem, Order, OrderStatus, PaymentMethod, PaymentSession, ShippingAddress, SubscriptionPlan,
  SubscriptionStatus, UserSubscription, VerificationDecision,
};
use crate::services::auth_service::Identity;
use crate::services::pricing::OrderTotals;
use crate::state::AppState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

// --- Checkout ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderLineInput {
  pub product_id: Uuid,
  pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewOrderInput {
  pub items: Vec<OrderLineInput>,
  pub shipping_address: ShippingAddress,
  pub delivery_date: NaiveDate,
  pub delivery_shift: DeliveryShift,
  pub payment_method: PaymentMethod,
  #[serde(default)]
  pub notes: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub now: DateTime<Utc>,
  pub input: NewOrderInput,
  pub line_items: Vec<LineItem>,
  pub totals: Option<OrderTotals>,
  pub order: Option<Order>,
  pub notified: bool,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, buyer_id: Uuid, input: NewOrderInput) -> Self {
    let now = app_state.now();
    Self { app_state, buyer_id, now, input, line_items: Vec::new(), totals: None, order: None, notified: false }
  }
}

// --- Order status changes ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
  /// Buyer cancels their own order.
  Cancel { reason: Option<String> },
  /// Admin moves the order along the lifecycle.
  AdminSet { status: OrderStatus, reason: Option<String> },
  /// Assigned delivery person hands the order over.
  MarkDelivered,
}

impl OrderAction {
  pub fn target_status(&self) -> OrderStatus {
    match self {
      OrderAction::Cancel { .. } => OrderStatus::Cancelled,
      OrderAction::AdminSet { status, .. } => *status,
      OrderAction::MarkDelivered => OrderStatus::Delivered,
    }
  }
}

#[derive(Clone)]
pub struct OrderStatusCtxData {
  pub app_state: AppState,
  pub actor: Identity,
  pub order_id: Uuid,
  pub action: OrderAction,
  pub now: DateTime<Utc>,
  pub order: Option<Order>,
  pub previous_status: Option<OrderStatus>,
  pub notified: bool,
}

impl OrderStatusCtxData {
  pub fn new(app_state: AppState, actor: Identity, order_id: Uuid, action: OrderAction) -> Self {
    let now = app_state.now();
    Self { app_state, actor, order_id, action, now, order: None, previous_status: None, notified: false }
  }
}

// --- Payment sessions ---

/// What a new session collects money for. Exactly one of the two must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentTargetInput {
  #[serde(default)]
  pub order_ids: Vec<Uuid>,
  #[serde(default)]
  pub subscription_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CreatePaymentSessionCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub now: DateTime<Utc>,
  pub target: PaymentTargetInput,
  pub orders: Vec<Order>,
  pub subscription: Option<UserSubscription>,
  pub amount_paise: i64,
  pub session: Option<PaymentSession>,
}

impl CreatePaymentSessionCtxData {
  pub fn new(app_state: AppState, buyer_id: Uuid, target: PaymentTargetInput) -> Self {
    let now = app_state.now();
    Self { app_state, buyer_id, now, target, orders: Vec::new(), subscription: None, amount_paise: 0, session: None }
  }
}

#[derive(Clone)]
pub struct SubmitPaymentCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub session_id: Uuid,
  pub transaction_id: String,
  pub upi_reference_number: Option<String>,
  pub now: DateTime<Utc>,
  pub session: Option<PaymentSession>,
}

impl SubmitPaymentCtxData {
  pub fn new(
    app_state: AppState,
    buyer_id: Uuid,
    session_id: Uuid,
    transaction_id: String,
    upi_reference_number: Option<String>,
  ) -> Self {
    let now = app_state.now();
    Self { app_state, buyer_id, session_id, transaction_id, upi_reference_number, now, session: None }
  }
}

#[derive(Clone)]
pub struct VerifyPaymentCtxData {
  pub app_state: AppState,
  pub admin_id: Uuid,
  pub session_id: Uuid,
  pub decision: VerificationDecision,
  pub reason: Option<String>,
  pub now: DateTime<Utc>,
  pub session: Option<PaymentSession>,
  pub notified: bool,
}

impl VerifyPaymentCtxData {
  pub fn new(
    app_state: AppState,
    admin_id: Uuid,
    session_id: Uuid,
    decision: VerificationDecision,
    reason: Option<String>,
  ) -> Self {
    let now = app_state.now();
    Self { app_state, admin_id, session_id, decision, reason, now, session: None, notified: false }
  }
}

// --- Subscriptions ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewSubscriptionInput {
  pub plan_id: Uuid,
  pub start_date: NaiveDate,
  pub delivery_address: ShippingAddress,
  #[serde(default = "default_shift")]
  pub preferred_delivery_time: DeliveryShift,
}

fn default_shift() -> DeliveryShift {
  DeliveryShift::Morning
}

#[derive(Clone)]
pub struct SubscribeCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub now: DateTime<Utc>,
  pub input: NewSubscriptionInput,
  pub plan: Option<SubscriptionPlan>,
  pub subscription: Option<UserSubscription>,
  pub notified: bool,
}

impl SubscribeCtxData {
  pub fn new(app_state: AppState, buyer_id: Uuid, input: NewSubscriptionInput) -> Self {
    let now = app_state.now();
    Self { app_state, buyer_id, now, input, plan: None, subscription: None, notified: false }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
  Cancel { reason: Option<String> },
  Pause,
  Resume,
  ResolveCancellation { approve: bool },
  RecordDelivery { outcome: DeliveryOutcome },
}

impl SubscriptionChange {
  pub fn is_admin_only(&self) -> bool {
    matches!(self, SubscriptionChange::ResolveCancellation { .. } | SubscriptionChange::RecordDelivery { .. })
  }

  pub fn label(&self) -> &'static str {
    match self {
      SubscriptionChange::Cancel { .. } => "cancel",
      SubscriptionChange::Pause => "pause",
      SubscriptionChange::Resume => "resume",
      SubscriptionChange::ResolveCancellation { .. } => "resolve_cancellation",
      SubscriptionChange::RecordDelivery { .. } => "record_delivery",
    }
  }
}

#[derive(Clone)]
pub struct SubscriptionChangeCtxData {
  pub app_state: AppState,
  pub actor: Identity,
  pub subscription_id: Uuid,
  pub change: SubscriptionChange,
  pub now: DateTime<Utc>,
  pub subscription: Option<UserSubscription>,
  /// Stored status at load time; the write is conditional on it.
  pub loaded_status: Option<SubscriptionStatus>,
  /// The plan ran past its end date and was settled as expired instead of changed.
  pub expired_on_load: bool,
  pub notified: bool,
}

impl SubscriptionChangeCtxData {
  pub fn new(app_state: AppState, actor: Identity, subscription_id: Uuid, change: SubscriptionChange) -> Self {
    let now = app_state.now();
    Self {
      app_state,
      actor,
      subscription_id,
      change,
      now,
      subscription: None,
      loaded_status: None,
      expired_on_load: false,
      notified: false,
    }
  }
}
