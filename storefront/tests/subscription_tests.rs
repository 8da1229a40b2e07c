// dairy_storefront/tests/subscription_tests.rs

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use chrono::Duration;
use common::*;
use dairy_storefront::models::subscription::DeliveryOutcome;
use dairy_storefront::models::{PaymentStatus, SubscriptionStatus};
use dairy_storefront::services::auth_service::Role;
use dairy_storefront::store::Store;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

fn subscribe_body(plan_id: Uuid, start: chrono::NaiveDate) -> Value {
  json!({
    "planId": plan_id,
    "startDate": start,
    "deliveryAddress": address_json(),
    "preferredDeliveryTime": "morning",
  })
}

/// Subscribes, pays and has an admin approve. Returns the active subscription id.
macro_rules! active_subscription {
  ($app:expr, $h:expr, $buyer:expr, $admin:expr) => {{
    let plan = $h.seed_plan(7, 42_000).await;
    let (status, body) = call!($app, post("/api/v1/subscriptions", &$buyer, subscribe_body(plan.id, tomorrow())));
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let sub_id = uuid_at(&body, "/subscription/id");
    let (status, body) = call!($app, post("/api/v1/payments/sessions", &$buyer, json!({ "subscriptionId": sub_id })));
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let session_id = uuid_at(&body, "/session/id");
    let submit = format!("/api/v1/payments/sessions/{}/submit", session_id);
    let (status, _) = call!($app, post(&submit, &$buyer, json!({ "upiTransactionId": "T2025061000001" })));
    assert_eq!(status, StatusCode::OK);
    let verify = format!("/api/v1/admin/subscriptions/{}/payment", sub_id);
    let (status, body) = call!($app, post(&verify, &$admin, json!({ "decision": "approve" })));
    assert_eq!(status, StatusCode::OK, "{}", body);
    sub_id
  }};
}

#[actix_web::test]
#[serial]
async fn subscribe_pay_and_activate() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let plan = h.seed_plan(7, 42_000).await;

  let (status, body) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(plan.id, tomorrow())));
  assert_eq!(status, StatusCode::CREATED, "{}", body);
  assert_eq!(body["subscription"]["status"], "pending");
  assert_eq!(body["subscription"]["endDate"], "2025-06-17");
  assert_eq!(body["subscription"]["pricePaise"], 42_000);
  assert_eq!(body["remainingDeliveries"], 7);
  let sub_id = uuid_at(&body, "/subscription/id");

  let (status, body) = call!(app, post("/api/v1/payments/sessions", &buyer, json!({ "subscriptionId": sub_id })));
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["session"]["totalAmountPaise"], 42_000);
  let session_id = uuid_at(&body, "/session/id");

  let submit = format!("/api/v1/payments/sessions/{}/submit", session_id);
  let (status, _) = call!(app, post(&submit, &buyer, json!({ "upiTransactionId": "T2025061000001" })));
  assert_eq!(status, StatusCode::OK);
  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Processing);

  let (_, body) = call!(app, get("/api/v1/admin/subscriptions/pending", &admin));
  assert_eq!(body["subscriptions"].as_array().unwrap().len(), 1);

  let verify = format!("/api/v1/admin/subscriptions/{}/payment", sub_id);
  let (status, body) = call!(app, post(&verify, &admin, json!({ "decision": "approve" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["subscription"]["status"], "active");
  assert_eq!(body["subscription"]["paymentStatus"], "paid");
  assert_eq!(body["subscription"]["paymentId"], json!(session_id));

  let (_, body) = call!(app, get("/api/v1/admin/subscriptions/pending", &admin));
  assert!(body["subscriptions"].as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn rejected_subscription_payment_returns_to_pending() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let plan = h.seed_plan(15, 85_000).await;
  let (_, body) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(plan.id, tomorrow())));
  let sub_id = uuid_at(&body, "/subscription/id");
  let (_, body) = call!(app, post("/api/v1/payments/sessions", &buyer, json!({ "subscriptionId": sub_id })));
  let session_id = uuid_at(&body, "/session/id");
  call!(app, post(&format!("/api/v1/payments/sessions/{}/submit", session_id), &buyer, json!({ "upiTransactionId": "T99887766" })));

  let verify = format!("/api/v1/admin/subscriptions/{}/payment", sub_id);
  let (status, body) = call!(app, post(&verify, &admin, json!({ "decision": "reject", "reason": "Amount mismatch" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Pending);
  assert_eq!(stored.payment_status, PaymentStatus::Failed);

  // The buyer can try again with a fresh session.
  let (status, _) = call!(app, post("/api/v1/payments/sessions", &buyer, json!({ "subscriptionId": sub_id })));
  assert_eq!(status, StatusCode::CREATED);
}

#[actix_web::test]
#[serial]
async fn start_date_and_plan_are_validated() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let plan = h.seed_plan(30, 160_000).await;

  let (status, _) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(plan.id, date(2025, 6, 10))));
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(Uuid::new_v4(), tomorrow())));
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = call!(app, actix_web::test::TestRequest::delete()
    .uri(&format!("/api/v1/admin/subscription-plans/{}", plan.id))
    .insert_header(admin.bearer()));
  assert_eq!(status, StatusCode::OK);
  let (status, _) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(plan.id, tomorrow())));
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (_, body) = call!(app, get("/api/v1/subscription-plans", &buyer));
  assert!(body["plans"].as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn unpaid_subscription_cancels_immediately() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let plan = h.seed_plan(7, 42_000).await;
  let (_, body) = call!(app, post("/api/v1/subscriptions", &buyer, subscribe_body(plan.id, tomorrow())));
  let sub_id = uuid_at(&body, "/subscription/id");

  let (status, _) = call!(app, post(&format!("/api/v1/subscriptions/{}/pause", sub_id), &buyer, json!({})));
  assert_eq!(status, StatusCode::CONFLICT);
  let (status, body) = call!(app, post(&format!("/api/v1/subscriptions/{}/cancel", sub_id), &buyer, json!({ "reason": "Moved" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["subscription"]["status"], "cancelled");
}

#[actix_web::test]
#[serial]
async fn pause_resume_shifts_schedule() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let sub_id = active_subscription!(app, h, buyer, admin);

  let (status, body) = call!(app, post(&format!("/api/v1/subscriptions/{}/pause", sub_id), &buyer, json!({})));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["subscription"]["status"], "paused");

  h.clock.set(ist(2025, 6, 13, 10, 0, 0));
  let (status, body) = call!(app, post(&format!("/api/v1/subscriptions/{}/resume", sub_id), &buyer, json!({})));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["subscription"]["status"], "active");
  assert_eq!(body["subscription"]["nextDeliveryDate"], "2025-06-14");
  assert_eq!(body["subscription"]["endDate"], "2025-06-20");

  let other = User::new(Role::Buyer);
  let (status, _) = call!(app, post(&format!("/api/v1/subscriptions/{}/pause", sub_id), &other, json!({})));
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
#[serial]
async fn running_plan_cancellation_needs_admin() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let sub_id = active_subscription!(app, h, buyer, admin);
  let cancel = format!("/api/v1/subscriptions/{}/cancel", sub_id);
  let decide = format!("/api/v1/admin/subscriptions/{}/cancellation", sub_id);

  let (status, body) = call!(app, post(&cancel, &buyer, json!({ "reason": "Too much milk" })));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["subscription"]["status"], "cancellation_requested");

  let (status, _) = call!(app, post(&decide, &buyer, json!({ "approve": true })));
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, body) = call!(app, post(&decide, &admin, json!({ "approve": false })));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["subscription"]["status"], "active");

  call!(app, post(&cancel, &buyer, json!({})));
  let (status, body) = call!(app, post(&decide, &admin, json!({ "approve": true })));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["subscription"]["status"], "cancelled");
  let (status, _) = call!(app, post(&decide, &admin, json!({ "approve": true })));
  assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
#[serial]
async fn recording_every_delivery_completes_plan() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let sub_id = active_subscription!(app, h, buyer, admin);
  let record = format!("/api/v1/admin/subscriptions/{}/deliveries", sub_id);

  for day in 0..7 {
    let outcome = if day == 2 { "skipped" } else { "delivered" };
    let (status, body) = call!(app, post(&record, &admin, json!({ "outcome": outcome })));
    assert_eq!(status, StatusCode::OK, "{}", body);
  }
  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Completed);
  assert_eq!(stored.completed_deliveries, 6);
  assert_eq!(stored.skipped_deliveries, 1);
  assert_eq!(stored.remaining_deliveries(), 0);

  let (status, _) = call!(app, post(&record, &admin, json!({ "outcome": "delivered" })));
  assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
#[serial]
async fn plan_past_end_date_expires_on_next_change() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let sub_id = active_subscription!(app, h, buyer, admin);

  h.clock.advance(Duration::days(10));
  let (_, body) = call!(app, get("/api/v1/subscriptions", &buyer));
  assert_eq!(body["subscriptions"][0]["effectiveStatus"], "expired");
  assert_eq!(body["subscriptions"][0]["subscription"]["status"], "active");

  let (status, body) = call!(app, post(&format!("/api/v1/subscriptions/{}/pause", sub_id), &buyer, json!({})));
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "illegal_transition");
  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Expired);
}

#[actix_web::test]
#[serial]
async fn writes_from_the_same_snapshot_do_not_overwrite_each_other() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let sub_id = active_subscription!(app, h, buyer, admin);
  let now = h.clock_now();

  let loaded = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  let mut delivered = loaded.clone();
  let mut skipped = loaded.clone();
  let mut paused = loaded.clone();
  delivered.record_delivery(DeliveryOutcome::Delivered, now).unwrap();
  skipped.record_delivery(DeliveryOutcome::Skipped, now).unwrap();
  paused.pause(now).unwrap();

  assert!(h.store.update_subscription(&delivered).await.unwrap());
  assert!(!h.store.update_subscription(&skipped).await.unwrap());
  assert!(!h.store.update_subscription(&paused).await.unwrap());

  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Active);
  assert_eq!(stored.completed_deliveries, 1);
  assert_eq!(stored.skipped_deliveries, 0);
  assert_eq!(stored.next_delivery_date, tomorrow() + Duration::days(1));

  // A fresh request reloads and lands on top of the first write.
  let record = format!("/api/v1/admin/subscriptions/{}/deliveries", sub_id);
  let (status, body) = call!(app, post(&record, &admin, json!({ "outcome": "skipped" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  let stored = h.store.get_subscription(sub_id).await.unwrap().unwrap();
  assert_eq!(stored.completed_deliveries, 1);
  assert_eq!(stored.skipped_deliveries, 1);
  assert_eq!(stored.next_delivery_date, tomorrow() + Duration::days(2));
}
