// dairy_storefront/src/web/handlers/subscription_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use milkflow::ContextData;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::types::Json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::payment_handlers::session_view;
use super::{run_workflow, take_result};
use crate::errors::AppError;
use crate::models::subscription::DeliveryOutcome;
use crate::models::{MilkType, SubscriptionPlan, SubscriptionStatus, UserSubscription, VerificationDecision};
use crate::pipelines::common_steps::not_found;
use crate::pipelines::contexts::{
  NewSubscriptionInput, SubscribeCtxData, SubscriptionChange, SubscriptionChangeCtxData, VerifyPaymentCtxData,
};
use crate::services::auth_service::{Identity, Role};
use crate::services::slots;
use crate::state::AppState;
use crate::store::SubscriptionFilter;

fn subscription_view(sub: &UserSubscription, today: NaiveDate) -> Value {
  json!({
    "subscription": sub,
    "effectiveStatus": sub.effective_status(today),
    "remainingDeliveries": sub.remaining_deliveries(),
  })
}

fn local_today(app_state: &AppState) -> NaiveDate {
  slots::local_today(app_state.now(), app_state.policy().utc_offset)
}

// --- Plans (public) ---

#[instrument(name = "handler::list_plans", skip(app_state))]
pub async fn list_plans_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let plans = app_state.store.list_plans(false).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "plans": plans })))
}

#[instrument(name = "handler::get_plan", skip(app_state, path), fields(plan_id = %path.as_ref()))]
pub async fn get_plan_handler(app_state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, AppError> {
  let plan_id = path.into_inner();
  match app_state.store.get_plan(plan_id).await? {
    Some(plan) if plan.is_active => Ok(HttpResponse::Ok().json(json!({ "success": true, "plan": plan }))),
    _ => Err(not_found("Subscription plan", plan_id)),
  }
}

// --- Buyer lifecycle ---

#[instrument(name = "handler::subscribe", skip(app_state, identity, body), fields(user_id = %identity.user_id))]
pub async fn subscribe_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewSubscriptionInput>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let ctx = ContextData::new(SubscribeCtxData::new(app_state.get_ref().clone(), identity.user_id, body.into_inner()));
  run_workflow(&app_state, ctx.clone()).await?;

  let sub = take_result(&ctx, |data| data.subscription.take())?;
  let mut body = subscription_view(&sub, local_today(&app_state));
  body["success"] = json!(true);
  body["message"] = json!("Subscription created. Complete the payment to activate it.");
  Ok(HttpResponse::Created().json(body))
}

#[instrument(name = "handler::list_my_subscriptions", skip(app_state, identity), fields(user_id = %identity.user_id))]
pub async fn list_my_subscriptions_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let filter = SubscriptionFilter { user_id: Some(identity.user_id), statuses: Vec::new() };
  let today = local_today(&app_state);
  let subs: Vec<Value> = app_state
    .store
    .list_subscriptions(&filter)
    .await?
    .iter()
    .map(|s| subscription_view(s, today))
    .collect();
  Ok(HttpResponse::Ok().json(json!({ "success": true, "subscriptions": subs })))
}

async fn run_change(
  app_state: &web::Data<AppState>,
  identity: Identity,
  subscription_id: Uuid,
  change: SubscriptionChange,
  message: &str,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(SubscriptionChangeCtxData::new(
    app_state.get_ref().clone(),
    identity,
    subscription_id,
    change,
  ));
  run_workflow(app_state, ctx.clone()).await?;

  let sub = take_result(&ctx, |data| data.subscription.take())?;
  let mut body = subscription_view(&sub, local_today(app_state));
  body["success"] = json!(true);
  body["message"] = json!(message);
  Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelSubscriptionRequest {
  #[serde(default)]
  pub reason: Option<String>,
}

#[instrument(name = "handler::cancel_subscription", skip(app_state, identity, path, body), fields(subscription_id = %path.as_ref()))]
pub async fn cancel_subscription_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: Option<web::Json<CancelSubscriptionRequest>>,
) -> Result<HttpResponse, AppError> {
  let reason = body.and_then(|b| b.into_inner().reason);
  run_change(&app_state, identity, path.into_inner(), SubscriptionChange::Cancel { reason }, "Cancellation recorded.").await
}

#[instrument(name = "handler::pause_subscription", skip(app_state, identity, path), fields(subscription_id = %path.as_ref()))]
pub async fn pause_subscription_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  run_change(&app_state, identity, path.into_inner(), SubscriptionChange::Pause, "Subscription paused.").await
}

#[instrument(name = "handler::resume_subscription", skip(app_state, identity, path), fields(subscription_id = %path.as_ref()))]
pub async fn resume_subscription_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  run_change(&app_state, identity, path.into_inner(), SubscriptionChange::Resume, "Subscription resumed.").await
}

// --- Admin: plans ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPlanRequest {
  pub name: String,
  pub milk_type: MilkType,
  pub volume: String,
  pub duration_days: i32,
  pub price_paise: i64,
  pub original_price_paise: i64,
  #[serde(default)]
  pub features: Vec<String>,
  #[serde(default = "default_true")]
  pub is_active: bool,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanPatchRequest {
  pub name: Option<String>,
  pub milk_type: Option<MilkType>,
  pub volume: Option<String>,
  pub duration_days: Option<i32>,
  pub price_paise: Option<i64>,
  pub original_price_paise: Option<i64>,
  pub features: Option<Vec<String>>,
  pub is_active: Option<bool>,
}

#[instrument(name = "handler::admin_create_plan", skip(app_state, identity, body), fields(admin_id = %identity.user_id))]
pub async fn admin_create_plan_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewPlanRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let req = body.into_inner();
  let now = app_state.now();
  let mut plan = SubscriptionPlan {
    id: Uuid::new_v4(),
    name: req.name.trim().to_string(),
    milk_type: req.milk_type,
    volume: req.volume.trim().to_string(),
    duration_days: req.duration_days,
    price_paise: req.price_paise,
    original_price_paise: req.original_price_paise,
    daily_price_paise: 0,
    discount_percent: 0,
    features: Json(req.features),
    is_active: req.is_active,
    created_at: now,
    updated_at: now,
  };
  plan.normalize()?;
  app_state.store.insert_plan(&plan).await?;
  info!(plan_id = %plan.id, "Subscription plan created.");
  Ok(HttpResponse::Created().json(json!({ "success": true, "message": "Plan created.", "plan": plan })))
}

#[instrument(name = "handler::admin_list_plans", skip(app_state, identity))]
pub async fn admin_list_plans_handler(app_state: web::Data<AppState>, identity: Identity) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let plans = app_state.store.list_plans(true).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "plans": plans })))
}

async fn load_plan(app_state: &AppState, plan_id: Uuid) -> Result<SubscriptionPlan, AppError> {
  app_state.store.get_plan(plan_id).await?.ok_or_else(|| not_found("Subscription plan", plan_id))
}

#[instrument(name = "handler::admin_update_plan", skip(app_state, identity, path, body), fields(plan_id = %path.as_ref()))]
pub async fn admin_update_plan_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<PlanPatchRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let patch = body.into_inner();
  let mut plan = load_plan(&app_state, path.into_inner()).await?;
  if let Some(name) = patch.name {
    plan.name = name.trim().to_string();
  }
  if let Some(milk_type) = patch.milk_type {
    plan.milk_type = milk_type;
  }
  if let Some(volume) = patch.volume {
    plan.volume = volume.trim().to_string();
  }
  if let Some(days) = patch.duration_days {
    plan.duration_days = days;
  }
  if let Some(price) = patch.price_paise {
    plan.price_paise = price;
  }
  if let Some(original) = patch.original_price_paise {
    plan.original_price_paise = original;
  }
  if let Some(features) = patch.features {
    plan.features = Json(features);
  }
  if let Some(active) = patch.is_active {
    plan.is_active = active;
  }
  plan.normalize()?;
  plan.updated_at = app_state.now();
  if !app_state.store.update_plan(&plan).await? {
    return Err(not_found("Subscription plan", plan.id));
  }
  info!("Subscription plan updated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Plan updated.", "plan": plan })))
}

/// Plans are never removed; deleting one deactivates it.
#[instrument(name = "handler::admin_deactivate_plan", skip(app_state, identity, path), fields(plan_id = %path.as_ref()))]
pub async fn admin_deactivate_plan_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let mut plan = load_plan(&app_state, path.into_inner()).await?;
  plan.is_active = false;
  plan.updated_at = app_state.now();
  if !app_state.store.update_plan(&plan).await? {
    return Err(not_found("Subscription plan", plan.id));
  }
  info!("Subscription plan deactivated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Plan deactivated.", "plan": plan })))
}

// --- Admin: subscriptions ---

/// Subscriptions waiting on an admin: unpaid or awaiting payment review, or asking to cancel.
#[instrument(name = "handler::admin_pending_subscriptions", skip(app_state, identity))]
pub async fn admin_pending_subscriptions_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let filter = SubscriptionFilter {
    user_id: None,
    statuses: vec![
      SubscriptionStatus::Pending,
      SubscriptionStatus::Processing,
      SubscriptionStatus::CancellationRequested,
    ],
  };
  let today = local_today(&app_state);
  let subs: Vec<Value> = app_state
    .store
    .list_subscriptions(&filter)
    .await?
    .iter()
    .map(|s| subscription_view(s, today))
    .collect();
  Ok(HttpResponse::Ok().json(json!({ "success": true, "subscriptions": subs })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerificationRequest {
  pub decision: VerificationDecision,
  #[serde(default)]
  pub reason: Option<String>,
}

/// Verifies or rejects the subscription's latest payment session.
#[instrument(name = "handler::admin_verify_subscription_payment", skip(app_state, identity, path, body), fields(subscription_id = %path.as_ref()))]
pub async fn admin_verify_subscription_payment_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<VerificationRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let subscription_id = path.into_inner();
  let req = body.into_inner();
  let session = app_state.store.latest_session_for_subscription(subscription_id).await?.ok_or_else(|| {
    warn!("Subscription has no payment session.");
    AppError::NotFound(format!("Subscription {} has no payment to verify", subscription_id))
  })?;

  let ctx = ContextData::new(VerifyPaymentCtxData::new(
    app_state.get_ref().clone(),
    identity.user_id,
    session.id,
    req.decision,
    req.reason,
  ));
  run_workflow(&app_state, ctx.clone()).await?;

  let now = ctx.read().now;
  let session = take_result(&ctx, |data| data.session.take())?;
  let subscription = app_state.store.get_subscription(subscription_id).await?;
  let mut body = session_view(&session, now);
  body["success"] = json!(true);
  body["subscription"] = json!(subscription);
  Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancellationDecisionRequest {
  pub approve: bool,
}

#[instrument(name = "handler::admin_resolve_cancellation", skip(app_state, identity, path, body), fields(subscription_id = %path.as_ref()))]
pub async fn admin_resolve_cancellation_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<CancellationDecisionRequest>,
) -> Result<HttpResponse, AppError> {
  let approve = body.into_inner().approve;
  let message = if approve { "Cancellation approved." } else { "Cancellation denied." };
  run_change(&app_state, identity, path.into_inner(), SubscriptionChange::ResolveCancellation { approve }, message).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeliveryRecordRequest {
  pub outcome: DeliveryOutcome,
}

#[instrument(name = "handler::admin_record_delivery", skip(app_state, identity, path, body), fields(subscription_id = %path.as_ref()))]
pub async fn admin_record_delivery_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<DeliveryRecordRequest>,
) -> Result<HttpResponse, AppError> {
  let outcome = body.into_inner().outcome;
  run_change(&app_state, identity, path.into_inner(), SubscriptionChange::RecordDelivery { outcome }, "Delivery recorded.")
    .await
}
