// dairy_storefront/src/web/handlers/admin_handlers.rs

//! Back-office: order approval and assignment, payment verification, delivery personnel.

use actix_web::{web, HttpResponse};
use futures_util::future::try_join_all;
use milkflow::ContextData;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::payment_handlers::session_view;
use super::subscription_handlers::VerificationRequest;
use super::{run_workflow, take_result};
use crate::errors::AppError;
use crate::models::{DeliveryPerson, DeliveryPersonStatus, OrderStatus, VerificationStatus};
use crate::pipelines::common_steps::{lost_race, not_found};
use crate::pipelines::contexts::{OrderAction, OrderStatusCtxData, VerifyPaymentCtxData};
use crate::services::auth_service::{Identity, Role};
use crate::state::AppState;
use crate::store::OrderFilter;

// --- Orders ---

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderListQuery {
  pub status: Option<OrderStatus>,
}

#[instrument(name = "handler::admin_list_orders", skip(app_state, identity, query))]
pub async fn admin_list_orders_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let filter = OrderFilter { status: query.status, ..OrderFilter::default() };
  let orders = app_state.store.list_orders(&filter).await?;
  info!(count = orders.len(), status = ?query.status, "Orders listed.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders })))
}

#[instrument(name = "handler::admin_pending_orders", skip(app_state, identity))]
pub async fn admin_pending_orders_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let filter = OrderFilter { status: Some(OrderStatus::Pending), ..OrderFilter::default() };
  let orders = app_state.store.list_orders(&filter).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderStatusRequest {
  pub status: OrderStatus,
  #[serde(default)]
  pub reason: Option<String>,
}

#[instrument(name = "handler::admin_update_order_status", skip(app_state, identity, path, body), fields(order_id = %path.as_ref()))]
pub async fn admin_update_order_status_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<OrderStatusRequest>,
) -> Result<HttpResponse, AppError> {
  let req = body.into_inner();
  let action = OrderAction::AdminSet { status: req.status, reason: req.reason };
  let ctx = ContextData::new(OrderStatusCtxData::new(app_state.get_ref().clone(), identity, path.into_inner(), action));
  run_workflow(&app_state, ctx.clone()).await?;

  let order = take_result(&ctx, |data| data.order.take())?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": format!("Order {}.", order.status.as_str()),
    "order": order,
  })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignOrderRequest {
  pub delivery_person_id: Uuid,
}

#[instrument(name = "handler::admin_assign_order", skip(app_state, identity, path, body), fields(order_id = %path.as_ref()))]
pub async fn admin_assign_order_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<AssignOrderRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let order_id = path.into_inner();
  let person_id = body.into_inner().delivery_person_id;

  let person = app_state
    .store
    .get_delivery_person(person_id)
    .await?
    .ok_or_else(|| not_found("Delivery person", person_id))?;
  if !person.can_take_orders() {
    return Err(AppError::Validation(format!("{} is not an approved delivery person", person.name)));
  }
  let mut order = app_state.store.get_order(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
  if order.status != OrderStatus::Confirmed {
    warn!(status = order.status.as_str(), "Only confirmed orders can be assigned.");
    return Err(AppError::IllegalTransition(format!(
      "Only confirmed orders can be assigned (order is {})",
      order.status.as_str()
    )));
  }
  order.delivery_person_id = Some(person.id);
  order.updated_at = app_state.now();
  if !app_state.store.update_order(&order, false).await? {
    return Err(lost_race("Order", order_id));
  }
  info!(delivery_person = %person.id, "Order assigned.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": format!("Order assigned to {}.", person.name),
    "order": order,
  })))
}

// --- Payments ---

/// Submitted sessions still inside their window, with the orders they cover.
#[instrument(name = "handler::admin_pending_payments", skip(app_state, identity))]
pub async fn admin_pending_payments_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let now = app_state.now();
  let sessions: Vec<_> = app_state
    .store
    .list_payment_sessions(Some(VerificationStatus::Submitted))
    .await?
    .into_iter()
    .filter(|s| !s.is_expired(now))
    .collect();

  let store = &app_state.store;
  let covered = try_join_all(sessions.iter().map(|s| store.get_orders(&s.order_ids))).await?;
  let payments: Vec<_> = sessions
    .iter()
    .zip(covered)
    .map(|(session, orders)| {
      let mut view = session_view(session, now);
      view["orders"] = json!(orders);
      view
    })
    .collect();
  Ok(HttpResponse::Ok().json(json!({ "success": true, "payments": payments })))
}

#[instrument(name = "handler::admin_verify_payment", skip(app_state, identity, path, body), fields(session_id = %path.as_ref()))]
pub async fn admin_verify_payment_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<VerificationRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let req = body.into_inner();
  let ctx = ContextData::new(VerifyPaymentCtxData::new(
    app_state.get_ref().clone(),
    identity.user_id,
    path.into_inner(),
    req.decision,
    req.reason,
  ));
  run_workflow(&app_state, ctx.clone()).await?;

  let now = ctx.read().now;
  let session = take_result(&ctx, |data| data.session.take())?;
  let mut body = session_view(&session, now);
  body["success"] = json!(true);
  body["message"] = json!(match session.verification_status {
    VerificationStatus::Verified => "Payment verified.",
    _ => "Payment rejected.",
  });
  Ok(HttpResponse::Ok().json(body))
}

// --- Delivery personnel ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewDeliveryPersonRequest {
  /// Account id carried as `sub` in the delivery person's bearer token.
  pub id: Uuid,
  pub name: String,
  pub phone: String,
  #[serde(default = "default_person_status")]
  pub status: DeliveryPersonStatus,
}

fn default_person_status() -> DeliveryPersonStatus {
  DeliveryPersonStatus::Pending
}

#[instrument(name = "handler::admin_create_delivery_person", skip(app_state, identity, body))]
pub async fn admin_create_delivery_person_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewDeliveryPersonRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let req = body.into_inner();
  let name = req.name.trim().to_string();
  let phone: String = req.phone.chars().filter(|c| !c.is_whitespace()).collect();
  if name.is_empty() {
    return Err(AppError::Validation("Name is required".to_string()));
  }
  if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
    return Err(AppError::Validation("Phone number must have 10 digits".to_string()));
  }
  let now = app_state.now();
  let person = DeliveryPerson { id: req.id, name, phone, status: req.status, created_at: now, updated_at: now };
  app_state.store.insert_delivery_person(&person).await?;
  info!(delivery_person = %person.id, "Delivery person registered.");
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "message": "Delivery person registered.",
    "deliveryPerson": person,
  })))
}

#[instrument(name = "handler::admin_list_delivery_persons", skip(app_state, identity))]
pub async fn admin_list_delivery_persons_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let persons = app_state.store.list_delivery_persons().await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "deliveryPersons": persons })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeliveryPersonStatusRequest {
  pub status: DeliveryPersonStatus,
}

#[instrument(name = "handler::admin_set_delivery_person_status", skip(app_state, identity, path, body), fields(delivery_person = %path.as_ref()))]
pub async fn admin_set_delivery_person_status_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<DeliveryPersonStatusRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let person_id = path.into_inner();
  let mut person = app_state
    .store
    .get_delivery_person(person_id)
    .await?
    .ok_or_else(|| not_found("Delivery person", person_id))?;
  person.status = body.into_inner().status;
  person.updated_at = app_state.now();
  if !app_state.store.update_delivery_person(&person).await? {
    return Err(not_found("Delivery person", person_id));
  }
  info!(status = ?person.status, "Delivery person status changed.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "deliveryPerson": person })))
}
