// dairy_storefront/tests/order_lifecycle_tests.rs

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use common::*;
use dairy_storefront::models::{CancelledBy, OrderStatus, PaymentStatus};
use dairy_storefront::services::auth_service::Role;
use dairy_storefront::store::Store;
use serde_json::json;
use serial_test::serial;

#[actix_web::test]
#[serial]
async fn buyer_cancels_before_cutoff_and_stock_returns() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let order = h.checkout(&buyer, &[(milk.id, 3)], "cod").await;
  assert_eq!(h.stock_of(milk.id).await, 7);

  let (status, body) = call!(app, get(&format!("/api/v1/orders/{}", order.id), &buyer));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["canCancel"], true);

  let uri = format!("/api/v1/orders/{}/cancel", order.id);
  let (status, body) = call!(app, post(&uri, &buyer, json!({ "reason": "Travelling" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["order"]["status"], "cancelled");
  assert_eq!(body["order"]["cancelledBy"], "user");
  assert_eq!(body["order"]["cancellationReason"], "Travelling");
  assert_eq!(h.stock_of(milk.id).await, 10);

  // Cancelling twice is illegal and does not restock again.
  let (status, body) = call!(app, post(&uri, &buyer, json!({})));
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "illegal_transition");
  assert_eq!(h.stock_of(milk.id).await, 10);
}

#[actix_web::test]
#[serial]
async fn cutoff_boundary_is_inclusive() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let first = h.checkout(&buyer, &[(milk.id, 1)], "cod").await;
  let second = h.checkout(&buyer, &[(milk.id, 1)], "cod").await;

  h.clock.set(ist(2025, 6, 10, 23, 59, 0));
  let (status, _) = call!(app, post(&format!("/api/v1/orders/{}/cancel", first.id), &buyer, json!({})));
  assert_eq!(status, StatusCode::OK);

  h.clock.set(ist(2025, 6, 10, 23, 59, 1));
  let (status, body) = call!(app, get(&format!("/api/v1/orders/{}", second.id), &buyer));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["canCancel"], false);
  let (status, body) = call!(app, post(&format!("/api/v1/orders/{}/cancel", second.id), &buyer, json!({})));
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "illegal_transition");
  let stored = h.store.get_order(second.id).await.unwrap().unwrap();
  assert_eq!(stored.status, OrderStatus::Pending);
}

#[actix_web::test]
#[serial]
async fn only_the_owner_can_see_or_cancel() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let other = User::new(Role::Buyer);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let order = h.checkout(&buyer, &[(milk.id, 1)], "cod").await;

  let (status, _) = call!(app, get(&format!("/api/v1/orders/{}", order.id), &other));
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _) = call!(app, post(&format!("/api/v1/orders/{}/cancel", order.id), &other, json!({})));
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, body) = call!(app, get("/api/v1/orders", &other));
  assert_eq!(status, StatusCode::OK);
  assert!(body["orders"].as_array().unwrap().is_empty());
  let (_, body) = call!(app, get("/api/v1/orders", &buyer));
  assert_eq!(body["orders"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
#[serial]
async fn concurrent_cancels_apply_once() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let order = h.checkout(&buyer, &[(milk.id, 4)], "cod").await;
  let uri = format!("/api/v1/orders/{}/cancel", order.id);

  let (a, b) = tokio::join!(
    actix_web::test::call_service(&app, post(&uri, &buyer, json!({})).to_request()),
    actix_web::test::call_service(&app, post(&uri, &buyer, json!({})).to_request()),
  );
  let statuses = [a.status(), b.status()];
  assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1, "{:?}", statuses);
  assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 1, "{:?}", statuses);
  assert_eq!(h.stock_of(milk.id).await, 10);
}

#[actix_web::test]
#[serial]
async fn admin_confirms_assigns_and_courier_delivers_cod() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let courier = User::new(Role::Delivery);
  let stranger_courier = User::new(Role::Delivery);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let order = h.checkout(&buyer, &[(milk.id, 2)], "cod").await;

  let (status, body) = call!(app, get("/api/v1/admin/orders/pending", &admin));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["orders"].as_array().unwrap().len(), 1);

  let status_uri = format!("/api/v1/admin/orders/{}/status", order.id);
  let (status, body) = call!(app, post(&status_uri, &admin, json!({ "status": "delivered" })));
  assert_eq!(status, StatusCode::CONFLICT, "pending cannot jump to delivered: {}", body);
  let (status, body) = call!(app, post(&status_uri, &admin, json!({ "status": "confirmed" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["order"]["status"], "confirmed");

  let register = json!({ "id": courier.id, "name": "Ramesh", "phone": "98220 12345" });
  let (status, body) = call!(app, post("/api/v1/admin/delivery-persons", &admin, register));
  assert_eq!(status, StatusCode::CREATED, "{}", body);
  assert_eq!(body["deliveryPerson"]["status"], "pending");

  let assign_uri = format!("/api/v1/admin/orders/{}/assign", order.id);
  let (status, _) = call!(app, post(&assign_uri, &admin, json!({ "deliveryPersonId": courier.id })));
  assert_eq!(status, StatusCode::BAD_REQUEST, "pending couriers cannot take orders");

  let person_uri = format!("/api/v1/admin/delivery-persons/{}/status", courier.id);
  let (status, _) = call!(app, post(&person_uri, &admin, json!({ "status": "approved" })));
  assert_eq!(status, StatusCode::OK);
  let (status, body) = call!(app, post(&assign_uri, &admin, json!({ "deliveryPersonId": courier.id })));
  assert_eq!(status, StatusCode::OK, "{}", body);

  let (status, body) = call!(app, get("/api/v1/delivery/orders", &courier));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["orders"][0]["id"], json!(order.id));
  let (status, _) = call!(app, get("/api/v1/delivery/orders", &stranger_courier));
  assert_eq!(status, StatusCode::FORBIDDEN);

  let deliver_uri = format!("/api/v1/delivery/orders/{}/delivered", order.id);
  let (status, body) = call!(app, post(&deliver_uri, &courier, json!({})));
  assert_eq!(status, StatusCode::OK, "{}", body);
  assert_eq!(body["order"]["status"], "delivered");
  assert_eq!(body["order"]["paymentStatus"], "paid");
  let stored = h.store.get_order(order.id).await.unwrap().unwrap();
  assert!(stored.delivered_at.is_some());
  assert_eq!(stored.payment_status, PaymentStatus::Paid);

  // Terminal: admin cannot cancel a delivered order.
  let (status, _) = call!(app, post(&status_uri, &admin, json!({ "status": "cancelled" })));
  assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
#[serial]
async fn admin_cancel_is_attributed_to_admin() {
  let h = TestHarness::new();
  let app = init_app!(h);
  let buyer = User::new(Role::Buyer);
  let admin = User::new(Role::Admin);
  let milk = h.seed_product("Cow Milk", 6_000, 10).await;
  let order = h.checkout(&buyer, &[(milk.id, 2)], "cod").await;

  let uri = format!("/api/v1/admin/orders/{}/status", order.id);
  let (status, _) = call!(app, post(&uri, &buyer, json!({ "status": "cancelled" })));
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, body) = call!(app, post(&uri, &admin, json!({ "status": "cancelled", "reason": "Route closed" })));
  assert_eq!(status, StatusCode::OK, "{}", body);
  let stored = h.store.get_order(order.id).await.unwrap().unwrap();
  assert_eq!(stored.cancelled_by, Some(CancelledBy::Admin));
  assert_eq!(stored.cancellation_reason.as_deref(), Some("Route closed"));
  assert_eq!(h.stock_of(milk.id).await, 10);

  let (status, body) = call!(app, get("/api/v1/admin/orders?status=cancelled", &admin));
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["orders"].as_array().unwrap().len(), 1);
  let (status, _) = call!(app, get("/api/v1/admin/orders?status=bogus", &admin));
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
