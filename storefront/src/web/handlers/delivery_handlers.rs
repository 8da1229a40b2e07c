// dairy_storefront/src/web/handlers/delivery_handlers.rs

use actix_web::{web, HttpResponse};
use milkflow::ContextData;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{run_workflow, take_result};
use crate::errors::AppError;
use crate::pipelines::contexts::{OrderAction, OrderStatusCtxData};
use crate::services::auth_service::{Identity, Role};
use crate::state::AppState;
use crate::store::OrderFilter;

/// Only approved personnel may act; a suspended account keeps its token but loses access.
async fn ensure_active_courier(app_state: &AppState, identity: &Identity) -> Result<(), AppError> {
  identity.require(Role::Delivery)?;
  match app_state.store.get_delivery_person(identity.user_id).await? {
    Some(person) if person.can_take_orders() => Ok(()),
    _ => {
      warn!(delivery_person = %identity.user_id, "Delivery account is not approved.");
      Err(AppError::Forbidden("Delivery account is not approved".to_string()))
    }
  }
}

#[instrument(name = "handler::delivery_assigned_orders", skip(app_state, identity), fields(delivery_person = %identity.user_id))]
pub async fn assigned_orders_handler(app_state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse, AppError> {
  ensure_active_courier(&app_state, &identity).await?;
  let filter = OrderFilter { delivery_person_id: Some(identity.user_id), ..OrderFilter::default() };
  let orders = app_state.store.list_orders(&filter).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders })))
}

#[instrument(name = "handler::delivery_mark_delivered", skip(app_state, identity, path), fields(order_id = %path.as_ref()))]
pub async fn mark_delivered_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  ensure_active_courier(&app_state, &identity).await?;
  let ctx = ContextData::new(OrderStatusCtxData::new(
    app_state.get_ref().clone(),
    identity,
    path.into_inner(),
    OrderAction::MarkDelivered,
  ));
  run_workflow(&app_state, ctx.clone()).await?;

  let order = take_result(&ctx, |data| data.order.take())?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": "Order marked as delivered.",
    "order": order,
  })))
}
