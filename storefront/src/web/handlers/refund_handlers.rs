// dairy_storefront/src/web/handlers/refund_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
  OrderStatus, PaymentStatus, RefundDetails, RefundRequest, RefundStatus, RefundTarget, SubscriptionStatus,
};
use crate::pipelines::common_steps::{ensure_owner, lost_race, not_found};
use crate::services::auth_service::{Identity, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRefundRequest {
  pub target: RefundTarget,
  pub reason: String,
  pub refund_details: RefundDetails,
}

fn ensure_refundable(payment_status: PaymentStatus, cancelled: bool, kind: &str) -> Result<(), AppError> {
  match payment_status {
    PaymentStatus::Refunded => Err(AppError::AlreadyProcessed(format!("This {} was already refunded", kind))),
    PaymentStatus::Paid if cancelled => Ok(()),
    PaymentStatus::Paid => Err(AppError::Validation(format!("Only a cancelled {} can be refunded", kind))),
    _ => Err(AppError::Validation(format!("This {} has not been paid", kind))),
  }
}

#[instrument(name = "handler::create_refund", skip(app_state, identity, body), fields(user_id = %identity.user_id))]
pub async fn create_refund_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewRefundRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let req = body.into_inner();
  let reason = req.reason.trim().to_string();
  if reason.is_empty() {
    return Err(AppError::Validation("A reason for the refund is required".to_string()));
  }
  req.refund_details.validate()?;

  let (order_id, subscription_id, amount_paise) = match req.target {
    RefundTarget::Order(id) => {
      let order = app_state.store.get_order(id).await?.ok_or_else(|| not_found("Order", id))?;
      ensure_owner("order", order.user_id, identity.user_id)?;
      ensure_refundable(order.payment_status, order.status == OrderStatus::Cancelled, "order")?;
      (Some(id), None, order.total_amount_paise)
    }
    RefundTarget::Subscription(id) => {
      let sub = app_state.store.get_subscription(id).await?.ok_or_else(|| not_found("Subscription", id))?;
      ensure_owner("subscription", sub.user_id, identity.user_id)?;
      let cancelled = matches!(
        sub.status,
        SubscriptionStatus::Cancelled | SubscriptionStatus::CancellationRequested
      );
      ensure_refundable(sub.payment_status, cancelled, "subscription")?;
      (None, Some(id), sub.price_paise)
    }
  };

  let now = app_state.now();
  let refund = RefundRequest {
    id: Uuid::new_v4(),
    user_id: identity.user_id,
    order_id,
    subscription_id,
    amount_paise,
    reason,
    refund_details: Json(req.refund_details),
    status: RefundStatus::Pending,
    admin_notes: None,
    resolved_by: None,
    resolved_at: None,
    created_at: now,
    updated_at: now,
  };
  app_state.store.insert_refund(&refund).await.map_err(|e| {
    warn!(error = %e, "Refund request not recorded.");
    e
  })?;
  info!(refund_id = %refund.id, amount = refund.amount_paise, "Refund requested.");
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "message": "Refund request received.",
    "refund": refund,
  })))
}

#[instrument(name = "handler::list_my_refunds", skip(app_state, identity), fields(user_id = %identity.user_id))]
pub async fn list_my_refunds_handler(app_state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let refunds = app_state.store.list_refunds(Some(identity.user_id)).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "refunds": refunds })))
}

#[instrument(name = "handler::admin_list_refunds", skip(app_state, identity))]
pub async fn admin_list_refunds_handler(app_state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let refunds = app_state.store.list_refunds(None).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "refunds": refunds })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResolveRefundRequest {
  pub status: RefundStatus,
  #[serde(default)]
  pub notes: Option<String>,
}

#[instrument(name = "handler::admin_resolve_refund", skip(app_state, identity, path, body), fields(refund_id = %path.as_ref()))]
pub async fn admin_resolve_refund_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<ResolveRefundRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let refund_id = path.into_inner();
  let req = body.into_inner();
  let mut refund = app_state.store.get_refund(refund_id).await?.ok_or_else(|| not_found("Refund request", refund_id))?;
  let expected = refund.status;
  let notes = req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
  refund.resolve(req.status, identity.user_id, notes, app_state.now())?;

  if !app_state.store.resolve_refund(&refund, expected).await? {
    return Err(lost_race("Refund request", refund_id));
  }
  info!(from = expected.as_str(), to = refund.status.as_str(), "Refund request resolved.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": format!("Refund {}.", refund.status.as_str()),
    "refund": refund,
  })))
}
