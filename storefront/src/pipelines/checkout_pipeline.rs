// dairy_storefront/src/pipelines/checkout_pipeline.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::payment::format_rupees;
use crate::models::{LineItem, Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::pipelines::common_steps::{self, not_found};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::{pricing, slots};
use milkflow::{ContextData, Pipeline, PipelineControl, Registry, StepDef};
use sqlx::types::Json;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Largest quantity accepted for a single line.
pub const MAX_LINE_QUANTITY: i32 = 100;

pub fn register_checkout_pipeline(registry: &Registry<AppError>) {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::from_steps(vec![
    StepDef::required("validate_order_request"),
    StepDef::required("check_delivery_slot"),
    StepDef::required("snapshot_products"),
    StepDef::required("compute_totals"),
    StepDef::required("place_order"),
    StepDef::optional("notify_order_placed"),
  ]);

  p.on_root("validate_order_request", validate_order_request);
  p.on_root("check_delivery_slot", check_delivery_slot);
  p.on_root("snapshot_products", snapshot_products);
  p.on_root("compute_totals", compute_totals);
  p.on_root("place_order", place_order);
  p.on_root("notify_order_placed", notify_order_placed);

  registry.register_pipeline(p);
}

#[instrument(name = "pipeline::checkout::validate", skip_all, err(Display))]
async fn validate_order_request(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let guard = ctx.read();
  let input = &guard.input;

  if input.items.is_empty() {
    return Err(AppError::Validation("Order must contain at least one item".to_string()));
  }
  let mut seen = HashSet::new();
  for line in &input.items {
    if line.quantity <= 0 || line.quantity > MAX_LINE_QUANTITY {
      return Err(AppError::Validation(format!(
        "Quantity for product {} must be between 1 and {}",
        line.product_id, MAX_LINE_QUANTITY
      )));
    }
    if !seen.insert(line.product_id) {
      return Err(AppError::Validation(format!("Product {} appears more than once", line.product_id)));
    }
  }
  input.shipping_address.validate()?;

  match input.payment_method {
    PaymentMethod::Cod if !guard.app_state.policy().cod_enabled => {
      return Err(AppError::Validation("Cash on delivery is not available".to_string()));
    }
    PaymentMethod::Wallet => {
      return Err(AppError::Validation("Wallet payments are not supported".to_string()));
    }
    _ => {}
  }
  debug!(lines = input.items.len(), "Order request is well formed.");
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::checkout::check_slot", skip_all, err(Display))]
async fn check_delivery_slot(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let guard = ctx.read();
  let (date, shift) = (guard.input.delivery_date, guard.input.delivery_shift);
  slots::ensure_slot_available(date, shift, guard.now, guard.app_state.policy()).map_err(|e| {
    warn!(%date, shift = shift.as_str(), error = %e, "Requested delivery slot is closed.");
    e
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::checkout::snapshot_products", skip_all, err(Display))]
async fn snapshot_products(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (store, lines) = {
    let guard = ctx.read();
    (guard.app_state.store.clone(), guard.input.items.clone())
  };
  let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
  let products = store.get_products(&ids).await?;

  let mut line_items = Vec::with_capacity(lines.len());
  for line in &lines {
    let product = products
      .iter()
      .find(|p| p.id == line.product_id)
      .ok_or_else(|| not_found("Product", line.product_id))?;
    if !product.is_active {
      return Err(AppError::Validation(format!("{} is no longer sold", product.name)));
    }
    line_items.push(LineItem {
      product_id: product.id,
      name: product.name.clone(),
      unit: product.unit.clone(),
      unit_price_paise: product.price_paise,
      quantity: line.quantity,
    });
  }
  ctx.write().line_items = line_items;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::checkout::compute_totals", skip_all, err(Display))]
async fn compute_totals(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  ctx.update(|data| {
    let totals = pricing::compute_totals(&data.line_items, data.app_state.policy())?;
    debug!(total = totals.total_amount_paise, shipping = totals.shipping_fee_paise, "Totals computed.");
    data.totals = Some(totals);
    Ok(PipelineControl::Continue)
  })
}

#[instrument(name = "pipeline::checkout::place_order", skip_all, fields(buyer_id), err(Display))]
async fn place_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (store, order) = {
    let guard = ctx.read();
    tracing::Span::current().record("buyer_id", tracing::field::display(guard.buyer_id));
    let totals = guard
      .totals
      .ok_or_else(|| AppError::Internal("Totals were not computed before placing the order".to_string()))?;
    let input = &guard.input;
    let order = Order {
      id: Uuid::new_v4(),
      user_id: guard.buyer_id,
      items: Json(guard.line_items.clone()),
      shipping_address: Json(input.shipping_address.clone()),
      subtotal_paise: totals.subtotal_paise,
      shipping_fee_paise: totals.shipping_fee_paise,
      tax_paise: totals.tax_paise,
      discount_paise: totals.discount_paise,
      total_amount_paise: totals.total_amount_paise,
      delivery_shift: input.delivery_shift,
      delivery_date: input.delivery_date,
      status: OrderStatus::Pending,
      payment_status: PaymentStatus::Pending,
      payment_method: input.payment_method,
      notes: input.notes.clone().filter(|n| !n.trim().is_empty()),
      cancellation_reason: None,
      cancelled_by: None,
      delivery_person_id: None,
      created_at: guard.now,
      confirmed_at: None,
      delivered_at: None,
      cancelled_at: None,
      updated_at: guard.now,
      version: 0,
    };
    (guard.app_state.store.clone(), order)
  };

  store.place_order(&order).await.map_err(|e| {
    warn!(order_id = %order.id, error = %e, "Order was not placed.");
    e
  })?;
  info!(order_id = %order.id, total = order.total_amount_paise, "Order placed.");
  ctx.write().order = Some(order);
  Ok(PipelineControl::Continue)
}

async fn notify_order_placed(ctx: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order.clone())
  };
  let Some(order) = order else {
    return Ok(PipelineControl::Continue);
  };
  common_steps::notify_user(
    &app_state,
    order.user_id,
    format!("Order received for {}", order.delivery_date),
    format!(
      "We have your order of {} item(s) totalling Rs {}. Delivery: {} {}.",
      order.items.len(),
      format_rupees(order.total_amount_paise),
      order.delivery_date,
      order.delivery_shift.as_str()
    ),
  )
  .await?;
  ctx.write().notified = true;
  Ok(PipelineControl::Continue)
}
