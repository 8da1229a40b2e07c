// dairy_storefront/src/pipelines/order_status_pipeline.rs

//! Every order status change (buyer cancel, admin update, delivery hand-over)
//! runs through this pipeline so the transition table, the cutoff rule and the
//! conditional write are applied the same way.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{CancelledBy, OrderStatus};
use crate::pipelines::common_steps::{self, ensure_owner, lost_race, not_found};
use crate::pipelines::contexts::{OrderAction, OrderStatusCtxData};
use crate::services::auth_service::Role;
use milkflow::{ContextData, Pipeline, PipelineControl, Registry, StepDef};
use tracing::{info, instrument, warn};

pub fn register_order_status_pipeline(registry: &Registry<AppError>) {
  let mut p = Pipeline::<OrderStatusCtxData, AppError>::from_steps(vec![
    StepDef::required("load_order"),
    StepDef::required("authorize_actor"),
    StepDef::required("apply_transition"),
    StepDef::required("persist_order"),
    StepDef::optional("notify_status_change"),
  ]);

  p.on_root("load_order", load_order);
  p.on_root("authorize_actor", authorize_actor);
  p.on_root("apply_transition", apply_transition);
  p.on_root("persist_order", persist_order);
  p.on_root("notify_status_change", notify_status_change);

  registry.register_pipeline(p);
}

#[instrument(name = "pipeline::order_status::load", skip_all, err(Display))]
async fn load_order(ctx: ContextData<OrderStatusCtxData>) -> AppResult<PipelineControl> {
  let (store, order_id) = {
    let guard = ctx.read();
    (guard.app_state.store.clone(), guard.order_id)
  };
  let order = store.get_order(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
  ctx.update(|data| {
    data.previous_status = Some(order.status);
    data.order = Some(order);
  });
  Ok(PipelineControl::Continue)
}

async fn authorize_actor(ctx: ContextData<OrderStatusCtxData>) -> AppResult<PipelineControl> {
  let guard = ctx.read();
  let order = guard.order.as_ref().ok_or_else(|| not_found("Order", guard.order_id))?;
  let actor = guard.actor;
  match &guard.action {
    OrderAction::Cancel { .. } => {
      actor.require(Role::Buyer)?;
      ensure_owner("order", order.user_id, actor.user_id)?;
    }
    OrderAction::AdminSet { .. } => actor.require(Role::Admin)?,
    OrderAction::MarkDelivered => {
      actor.require(Role::Delivery)?;
      if order.delivery_person_id != Some(actor.user_id) {
        warn!(order_id = %order.id, delivery_person = %actor.user_id, "Order is not assigned to this delivery person.");
        return Err(AppError::Forbidden("This order is not assigned to you".to_string()));
      }
    }
  }
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::order_status::apply", skip_all, err(Display))]
async fn apply_transition(ctx: ContextData<OrderStatusCtxData>) -> AppResult<PipelineControl> {
  ctx.update(|data| {
    let policy = data.app_state.config.policy.clone();
    let now = data.now;
    let next = data.action.target_status();
    let (cancelled_by, reason) = match &data.action {
      OrderAction::Cancel { reason } => (CancelledBy::User, reason.clone()),
      OrderAction::AdminSet { reason, .. } => (CancelledBy::Admin, reason.clone()),
      OrderAction::MarkDelivered => (CancelledBy::Admin, None),
    };
    let order = data
      .order
      .as_mut()
      .ok_or_else(|| AppError::Internal("Order was not loaded".to_string()))?;
    order.apply_transition(next, now, &policy, cancelled_by, reason).map_err(|e| {
      warn!(order_id = %order.id, error = %e, "Order transition rejected.");
      e
    })?;
    Ok(PipelineControl::Continue)
  })
}

#[instrument(name = "pipeline::order_status::persist", skip_all, err(Display))]
async fn persist_order(ctx: ContextData<OrderStatusCtxData>) -> AppResult<PipelineControl> {
  let (store, order, expected) = {
    let guard = ctx.read();
    let order = guard
      .order
      .clone()
      .ok_or_else(|| AppError::Internal("Order was not loaded".to_string()))?;
    let expected = guard
      .previous_status
      .ok_or_else(|| AppError::Internal("Loaded order status is unknown".to_string()))?;
    (guard.app_state.store.clone(), order, expected)
  };
  let restock = order.status == OrderStatus::Cancelled;
  if !store.update_order(&order, restock).await? {
    warn!(order_id = %order.id, "Order changed while this request was in flight.");
    return Err(lost_race("Order", order.id));
  }
  info!(order_id = %order.id, from = expected.as_str(), to = order.status.as_str(), restock, "Order status updated.");
  Ok(PipelineControl::Continue)
}

async fn notify_status_change(ctx: ContextData<OrderStatusCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone())
  };
  let Some(order) = order else {
    return Ok(PipelineControl::Continue);
  };
  let body = match order.status {
    OrderStatus::Confirmed => format!("Your order for {} is confirmed.", order.delivery_date),
    OrderStatus::Delivered => "Your order has been delivered. Enjoy!".to_string(),
    OrderStatus::Cancelled => match &order.cancellation_reason {
      Some(reason) => format!("Your order was cancelled: {}", reason),
      None => "Your order was cancelled.".to_string(),
    },
    OrderStatus::Pending => return Ok(PipelineControl::Continue),
  };
  common_steps::notify_user(&app_state, order.user_id, format!("Order {}", order.status.as_str()), body).await?;
  ctx.write().notified = true;
  Ok(PipelineControl::Continue)
}
