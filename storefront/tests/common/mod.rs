// dairy_storefront/tests/common/mod.rs
#![allow(dead_code, unused_macros)]

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use dairy_storefront::config::{AppConfig, StorePolicy};
use dairy_storefront::models::{MilkType, Order, Product, SubscriptionPlan};
use dairy_storefront::pipelines::contexts::{CheckoutCtxData, NewOrderInput};
use dairy_storefront::services::auth_service::{issue_token, Role};
use dairy_storefront::services::notify::LogNotifier;
use dairy_storefront::state::{AppState, ManualClock};
use dairy_storefront::store::{MemoryStore, Store};
use milkflow::{ContextData, PipelineResult};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use sqlx::types::Json;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const JWT_SECRET: &str = "storefront-test-secret-01";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Instant in the dairy's local (IST) time.
pub fn ist(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
  StorePolicy::default()
    .utc_offset
    .with_ymd_and_hms(y, m, d, h, min, s)
    .unwrap()
    .with_timezone(&Utc)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Local "today" for every test: 2025-06-10, 10:00 IST.
pub fn start_time() -> DateTime<Utc> {
  ist(2025, 6, 10, 10, 0, 0)
}

pub fn tomorrow() -> NaiveDate {
  date(2025, 6, 11)
}

pub struct TestHarness {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub clock: Arc<ManualClock>,
}

impl TestHarness {
  pub fn new() -> Self {
    Self::with_policy(StorePolicy::default())
  }

  pub fn with_policy(policy: StorePolicy) -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut config = AppConfig::local(JWT_SECRET);
    config.policy = policy;
    let notifier = LogNotifier { sender: "tests@dairy.example".to_string() };
    let state = AppState::new(store.clone(), Arc::new(config), clock.clone(), Arc::new(notifier));
    Self { state, store, clock }
  }

  pub async fn seed_product(&self, name: &str, price_paise: i64, stock: i32) -> Product {
    let now = self.clock_now();
    let product = Product {
      id: Uuid::new_v4(),
      name: name.to_string(),
      description: None,
      category: "milk".to_string(),
      unit: "1 L".to_string(),
      price_paise,
      stock_quantity: stock,
      is_active: true,
      created_at: now,
      updated_at: now,
    };
    self.store.insert_product(&product).await.unwrap();
    product
  }

  pub async fn seed_plan(&self, duration_days: i32, price_paise: i64) -> SubscriptionPlan {
    let now = self.clock_now();
    let mut plan = SubscriptionPlan {
      id: Uuid::new_v4(),
      name: format!("Cow Milk {} days", duration_days),
      milk_type: MilkType::Cow,
      volume: "1 L".to_string(),
      duration_days,
      price_paise,
      original_price_paise: price_paise + 3_500,
      daily_price_paise: 0,
      discount_percent: 0,
      features: Json(vec!["Morning delivery".to_string()]),
      is_active: true,
      created_at: now,
      updated_at: now,
    };
    plan.normalize().unwrap();
    self.store.insert_plan(&plan).await.unwrap();
    plan
  }

  /// Runs checkout for `buyer` outside HTTP and returns the placed order.
  pub async fn checkout(&self, buyer: &User, lines: &[(Uuid, i32)], payment_method: &str) -> Order {
    let input: NewOrderInput = serde_json::from_value(order_body(lines, tomorrow(), payment_method)).unwrap();
    let ctx = ContextData::new(CheckoutCtxData::new(self.state.clone(), buyer.id, input));
    let outcome = self.state.workflows.run(ctx.clone()).await.unwrap();
    assert_eq!(outcome, PipelineResult::Completed);
    let order = ctx.read().order.clone();
    order.unwrap()
  }

  pub async fn stock_of(&self, product_id: Uuid) -> i32 {
    self.store.get_product(product_id).await.unwrap().unwrap().stock_quantity
  }

  pub fn clock_now(&self) -> DateTime<Utc> {
    self.state.now()
  }
}

pub struct User {
  pub id: Uuid,
  pub token: String,
}

impl User {
  pub fn new(role: Role) -> Self {
    let id = Uuid::new_v4();
    Self::with_id(id, role)
  }

  pub fn with_id(id: Uuid, role: Role) -> Self {
    let token = issue_token(JWT_SECRET, id, role, Duration::hours(1)).unwrap();
    Self { id, token }
  }

  pub fn bearer(&self) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", self.token))
  }
}

pub fn address_json() -> Value {
  json!({
    "name": "Asha Patil",
    "address": "12 MG Road",
    "city": "Pune",
    "state": "MH",
    "zipCode": "411001",
    "phone": "9876543210"
  })
}

pub fn order_body(lines: &[(Uuid, i32)], delivery_date: NaiveDate, payment_method: &str) -> Value {
  let items: Vec<Value> = lines
    .iter()
    .map(|(id, qty)| json!({ "productId": id, "quantity": qty }))
    .collect();
  json!({
    "items": items,
    "shippingAddress": address_json(),
    "deliveryDate": delivery_date,
    "deliveryShift": "morning",
    "paymentMethod": payment_method,
  })
}

pub async fn read_json<B: MessageBody>(resp: ServiceResponse<B>) -> (StatusCode, Value) {
  let status = resp.status();
  let bytes = test::read_body(resp).await;
  let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
  (status, body)
}

pub fn post(path: &str, user: &User, body: Value) -> TestRequest {
  TestRequest::post().uri(path).insert_header(user.bearer()).set_json(body)
}

pub fn get(path: &str, user: &User) -> TestRequest {
  TestRequest::get().uri(path).insert_header(user.bearer())
}

pub fn uuid_at(body: &Value, pointer: &str) -> Uuid {
  Uuid::parse_str(body.pointer(pointer).and_then(Value::as_str).unwrap()).unwrap()
}

/// Builds the full route table over the harness state.
macro_rules! init_app {
  ($harness:expr) => {
    actix_web::test::init_service(
      actix_web::App::new()
        .app_data(actix_web::web::Data::new($harness.state.clone()))
        .configure(dairy_storefront::web::configure_app_routes),
    )
    .await
  };
}

/// Sends a `TestRequest` and returns `(status, json body)`.
macro_rules! call {
  ($app:expr, $req:expr) => {
    common::read_json(actix_web::test::call_service(&$app, $req.to_request()).await).await
  };
}
