// dairy_storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use milkflow::ContextData;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{run_workflow, take_result};
use crate::errors::AppError;
use crate::pipelines::common_steps::{ensure_owner, not_found};
use crate::pipelines::contexts::{CheckoutCtxData, NewOrderInput, OrderAction, OrderStatusCtxData};
use crate::services::auth_service::{Identity, Role};
use crate::services::slots;
use crate::state::AppState;
use crate::store::OrderFilter;

/// Bookable delivery days computed from the server clock.
#[instrument(name = "handler::delivery_slots", skip(app_state))]
pub async fn delivery_slots_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let now = app_state.now();
  let days = slots::delivery_slots(now, app_state.policy());
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "serverTime": now,
    "days": days,
  })))
}

#[instrument(name = "handler::create_order", skip(app_state, identity, body), fields(user_id = %identity.user_id))]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewOrderInput>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let ctx = ContextData::new(CheckoutCtxData::new(app_state.get_ref().clone(), identity.user_id, body.into_inner()));
  run_workflow(&app_state, ctx.clone()).await?;

  let order = take_result(&ctx, |data| data.order.take())?;
  info!(order_id = %order.id, "Checkout completed.");
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "message": "Order placed.",
    "order": order,
  })))
}

#[instrument(name = "handler::list_my_orders", skip(app_state, identity), fields(user_id = %identity.user_id))]
pub async fn list_my_orders_handler(app_state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let filter = OrderFilter { user_id: Some(identity.user_id), ..OrderFilter::default() };
  let orders = app_state.store.list_orders(&filter).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders })))
}

#[instrument(name = "handler::get_my_order", skip(app_state, identity, path), fields(order_id = %path.as_ref()))]
pub async fn get_my_order_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let order_id = path.into_inner();
  let order = app_state.store.get_order(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
  ensure_owner("order", order.user_id, identity.user_id)?;
  let now = app_state.now();
  let cancellable = order.can_be_cancelled(now, app_state.policy());
  let cutoff = order.cancellation_cutoff(app_state.policy());
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "order": order,
    "canCancel": cancellable,
    "cancellationCutoff": cutoff,
  })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelOrderRequest {
  #[serde(default)]
  pub reason: Option<String>,
}

#[instrument(name = "handler::cancel_order", skip(app_state, identity, path, body), fields(order_id = %path.as_ref()))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: Option<web::Json<CancelOrderRequest>>,
) -> Result<HttpResponse, AppError> {
  let reason = body.and_then(|b| b.into_inner().reason);
  let action = OrderAction::Cancel { reason };
  let ctx = ContextData::new(OrderStatusCtxData::new(app_state.get_ref().clone(), identity, path.into_inner(), action));
  run_workflow(&app_state, ctx.clone()).await?;

  let order = take_result(&ctx, |data| data.order.take())?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": "Order cancelled.",
    "order": order,
  })))
}
