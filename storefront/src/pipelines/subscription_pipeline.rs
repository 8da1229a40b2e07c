// dairy_storefront/src/pipelines/subscription_pipeline.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::payment::format_rupees;
use crate::models::{SubscriptionStatus, UserSubscription};
use crate::pipelines::common_steps::{self, ensure_owner, lost_race, not_found};
use crate::pipelines::contexts::{SubscribeCtxData, SubscriptionChange, SubscriptionChangeCtxData};
use crate::services::auth_service::Role;
use crate::services::slots;
use milkflow::{ContextData, Pipeline, PipelineControl, Registry, StepDef};
use tracing::{info, instrument, warn};

pub fn register_subscription_pipelines(registry: &Registry<AppError>) {
  registry.register_pipeline(subscribe_pipeline());
  registry.register_pipeline(subscription_change_pipeline());
}

// --- Subscribe ---

fn subscribe_pipeline() -> Pipeline<SubscribeCtxData, AppError> {
  let mut p = Pipeline::from_steps(vec![
    StepDef::required("validate_request"),
    StepDef::required("load_plan"),
    StepDef::required("check_start_date"),
    StepDef::required("create_subscription"),
    StepDef::optional("notify_subscribed"),
  ]);
  p.on_root("validate_request", |ctx: ContextData<SubscribeCtxData>| async move {
    ctx.read().input.delivery_address.validate()?;
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("load_plan", load_plan);
  p.on_root("check_start_date", |ctx: ContextData<SubscribeCtxData>| async move {
    let guard = ctx.read();
    let input = &guard.input;
    slots::ensure_slot_available(input.start_date, input.preferred_delivery_time, guard.now, guard.app_state.policy())?;
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("create_subscription", create_subscription);
  p.on_root("notify_subscribed", notify_subscribed);
  p
}

async fn load_plan(ctx: ContextData<SubscribeCtxData>) -> AppResult<PipelineControl> {
  let (store, plan_id) = {
    let guard = ctx.read();
    (guard.app_state.store.clone(), guard.input.plan_id)
  };
  let plan = store.get_plan(plan_id).await?.ok_or_else(|| not_found("Subscription plan", plan_id))?;
  if !plan.is_active {
    return Err(AppError::Validation(format!("Plan {} is no longer offered", plan.name)));
  }
  ctx.write().plan = Some(plan);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::subscribe::create", skip_all, err(Display))]
async fn create_subscription(ctx: ContextData<SubscribeCtxData>) -> AppResult<PipelineControl> {
  let (store, sub) = {
    let guard = ctx.read();
    let plan = guard
      .plan
      .as_ref()
      .ok_or_else(|| AppError::Internal("Plan was not loaded".to_string()))?;
    let input = &guard.input;
    let sub = UserSubscription::new_pending(
      plan,
      guard.buyer_id,
      input.start_date,
      input.delivery_address.clone(),
      input.preferred_delivery_time,
      guard.now,
    );
    (guard.app_state.store.clone(), sub)
  };
  store.insert_subscription(&sub).await?;
  info!(subscription_id = %sub.id, plan = %sub.plan_name, start = %sub.start_date, end = %sub.end_date, "Subscription created.");
  ctx.write().subscription = Some(sub);
  Ok(PipelineControl::Continue)
}

async fn notify_subscribed(ctx: ContextData<SubscribeCtxData>) -> AppResult<PipelineControl> {
  let (app_state, sub) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.subscription.clone())
  };
  let Some(sub) = sub else {
    return Ok(PipelineControl::Continue);
  };
  common_steps::notify_user(
    &app_state,
    sub.user_id,
    format!("{} subscription created", sub.plan_name),
    format!(
      "Deliveries run {} to {}. Pay Rs {} to activate.",
      sub.start_date,
      sub.end_date,
      format_rupees(sub.price_paise)
    ),
  )
  .await?;
  ctx.write().notified = true;
  Ok(PipelineControl::Continue)
}

// --- Lifecycle changes ---

fn expired_on_load(ctx: ContextData<SubscriptionChangeCtxData>) -> bool {
  ctx.read().expired_on_load
}

fn subscription_change_pipeline() -> Pipeline<SubscriptionChangeCtxData, AppError> {
  let mut p = Pipeline::from_steps(vec![
    StepDef::required("load_subscription"),
    StepDef::required("authorize_actor"),
    StepDef::required("settle_expiry"),
    StepDef::required("apply_change").skip_when(expired_on_load),
    StepDef::required("persist_subscription"),
    StepDef::required("report_expiry").skip_when(|ctx| !expired_on_load(ctx)),
    StepDef::optional("notify_change"),
  ]);
  p.on_root("load_subscription", load_subscription);
  p.on_root("authorize_actor", authorize_actor);
  p.on_root("settle_expiry", |ctx: ContextData<SubscriptionChangeCtxData>| async move {
    ctx.update(|data| {
      let today = slots::local_today(data.now, data.app_state.policy().utc_offset);
      let now = data.now;
      if let Some(sub) = data.subscription.as_mut() {
        if sub.settle_expiry(today, now) {
          info!(subscription_id = %sub.id, end = %sub.end_date, "Subscription ran past its end date.");
          data.expired_on_load = true;
        }
      }
    });
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("apply_change", apply_change);
  p.on_root("persist_subscription", persist_subscription);
  p.on_root("report_expiry", |ctx: ContextData<SubscriptionChangeCtxData>| async move {
    let id = ctx.read().subscription_id;
    Err::<PipelineControl, _>(AppError::IllegalTransition(format!(
      "Subscription {} has expired and can no longer be changed",
      id
    )))
  });
  p.on_root("notify_change", notify_change);
  p
}

#[instrument(name = "pipeline::subscription::load", skip_all, err(Display))]
async fn load_subscription(ctx: ContextData<SubscriptionChangeCtxData>) -> AppResult<PipelineControl> {
  let (store, id) = {
    let guard = ctx.read();
    (guard.app_state.store.clone(), guard.subscription_id)
  };
  let sub = store.get_subscription(id).await?.ok_or_else(|| not_found("Subscription", id))?;
  ctx.update(|data| {
    data.loaded_status = Some(sub.status);
    data.subscription = Some(sub);
  });
  Ok(PipelineControl::Continue)
}

async fn authorize_actor(ctx: ContextData<SubscriptionChangeCtxData>) -> AppResult<PipelineControl> {
  let guard = ctx.read();
  let sub = guard
    .subscription
    .as_ref()
    .ok_or_else(|| not_found("Subscription", guard.subscription_id))?;
  if guard.change.is_admin_only() {
    guard.actor.require(Role::Admin)?;
  } else {
    guard.actor.require(Role::Buyer)?;
    ensure_owner("subscription", sub.user_id, guard.actor.user_id)?;
  }
  Ok(PipelineControl::Continue)
}

#[instrument(name = "pipeline::subscription::apply", skip_all, fields(change), err(Display))]
async fn apply_change(ctx: ContextData<SubscriptionChangeCtxData>) -> AppResult<PipelineControl> {
  ctx.update(|data| {
    tracing::Span::current().record("change", data.change.label());
    let now = data.now;
    let policy = data.app_state.config.policy.clone();
    let change = data.change.clone();
    let sub = data
      .subscription
      .as_mut()
      .ok_or_else(|| AppError::Internal("Subscription was not loaded".to_string()))?;
    let result = match change {
      SubscriptionChange::Cancel { reason } => sub.request_cancellation(reason, now),
      SubscriptionChange::Pause => sub.pause(now),
      SubscriptionChange::Resume => sub.resume(now, &policy),
      SubscriptionChange::ResolveCancellation { approve } => sub.resolve_cancellation(approve, now),
      SubscriptionChange::RecordDelivery { outcome } => sub.record_delivery(outcome, now),
    };
    if let Err(e) = &result {
      warn!(subscription_id = %sub.id, error = %e, "Subscription change rejected.");
    }
    result.map(|_| PipelineControl::Continue)
  })
}

#[instrument(name = "pipeline::subscription::persist", skip_all, err(Display))]
async fn persist_subscription(ctx: ContextData<SubscriptionChangeCtxData>) -> AppResult<PipelineControl> {
  let (store, sub, expected) = {
    let guard = ctx.read();
    let sub = guard
      .subscription
      .clone()
      .ok_or_else(|| AppError::Internal("Subscription was not loaded".to_string()))?;
    let expected = guard
      .loaded_status
      .ok_or_else(|| AppError::Internal("Loaded subscription status is unknown".to_string()))?;
    (guard.app_state.store.clone(), sub, expected)
  };
  if !store.update_subscription(&sub).await? {
    warn!(subscription_id = %sub.id, "Subscription changed while this request was in flight.");
    return Err(lost_race("Subscription", sub.id));
  }
  info!(subscription_id = %sub.id, from = expected.as_str(), to = sub.status.as_str(), "Subscription updated.");
  Ok(PipelineControl::Continue)
}

async fn notify_change(ctx: ContextData<SubscriptionChangeCtxData>) -> AppResult<PipelineControl> {
  let (app_state, sub, loaded) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.subscription.clone(), guard.loaded_status)
  };
  let Some(sub) = sub else {
    return Ok(PipelineControl::Continue);
  };
  // Delivery bookkeeping that leaves the status alone is not worth a message.
  if loaded == Some(sub.status) {
    return Ok(PipelineControl::Continue);
  }
  let body = match sub.status {
    SubscriptionStatus::Paused => "Your deliveries are paused.".to_string(),
    SubscriptionStatus::Active => format!("Deliveries resume on {}.", sub.next_delivery_date),
    SubscriptionStatus::CancellationRequested => "We received your cancellation request.".to_string(),
    SubscriptionStatus::Cancelled => "Your subscription is cancelled.".to_string(),
    SubscriptionStatus::Completed => "All deliveries for your plan are done. Thank you!".to_string(),
    other => format!("Your subscription is now {}.", other.as_str()),
  };
  common_steps::notify_user(&app_state, sub.user_id, format!("{} update", sub.plan_name), body).await?;
  ctx.write().notified = true;
  Ok(PipelineControl::Continue)
}
