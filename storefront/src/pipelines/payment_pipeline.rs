// dairy_storefront/src/pipelines/payment_pipeline.rs

//! Manual UPI payment: open a session, let the buyer submit the transaction id,
//! let an admin verify or reject it.

use crate::config::StorePolicy;
use crate::errors::{AppError, Result as AppResult};
use crate::models::payment::{self, format_rupees};
use crate::models::{
  OrderStatus, PaymentMethod, PaymentSession, SubscriptionStatus, VerificationDecision, VerificationStatus,
};
use crate::pipelines::common_steps::{self, ensure_owner, lost_race, not_found};
use crate::pipelines::contexts::{CreatePaymentSessionCtxData, SubmitPaymentCtxData, VerifyPaymentCtxData};
use crate::services::slots;
use chrono::NaiveDate;
use milkflow::{ContextData, Pipeline, PipelineControl, Registry, StepDef};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Fresh references drawn before a collision is reported to the caller.
const MAX_REFERENCE_ATTEMPTS: u32 = 3;

pub fn register_payment_pipelines(registry: &Registry<AppError>) {
  registry.register_pipeline(create_session_pipeline());
  registry.register_pipeline(submit_payment_pipeline());
  registry.register_pipeline(verify_payment_pipeline());
}

// --- Create session ---

fn create_session_pipeline() -> Pipeline<CreatePaymentSessionCtxData, AppError> {
  let mut p = Pipeline::from_steps(vec![
    StepDef::required("validate_targets"),
    StepDef::required("load_targets"),
    StepDef::required("build_session"),
    StepDef::required("claim_and_persist"),
  ]);
  p.on_root("validate_targets", validate_targets);
  p.on_root("load_targets", load_targets);
  p.on_root("build_session", build_session);
  p.on_root("claim_and_persist", claim_and_persist);
  p
}

async fn validate_targets(ctx: ContextData<CreatePaymentSessionCtxData>) -> AppResult<PipelineControl> {
  let guard = ctx.read();
  let target = &guard.target;
  match (target.order_ids.is_empty(), target.subscription_id) {
    (false, Some(_)) => Err(AppError::Validation(
      "A payment session covers either orders or a subscription, not both".to_string(),
    )),
    (true, None) => Err(AppError::Validation("Nothing to pay for".to_string())),
    (false, None) => {
      let distinct: HashSet<&Uuid> = target.order_ids.iter().collect();
      if distinct.len() != target.order_ids.len() {
        return Err(AppError::Validation("Order ids must be distinct".to_string()));
      }
      Ok(PipelineControl::Continue)
    }
    (true, Some(_)) => Ok(PipelineControl::Continue),
  }
}

#[instrument(name = "pipeline::payment::load_targets", skip_all, fields(buyer_id), err(Display))]
async fn load_targets(ctx: ContextData<CreatePaymentSessionCtxData>) -> AppResult<PipelineControl> {
  let (store, buyer_id, target) = {
    let guard = ctx.read();
    (guard.app_state.store.clone(), guard.buyer_id, guard.target.clone())
  };
  tracing::Span::current().record("buyer_id", tracing::field::display(buyer_id));

  if let Some(sub_id) = target.subscription_id {
    let sub = store.get_subscription(sub_id).await?.ok_or_else(|| not_found("Subscription", sub_id))?;
    ensure_owner("subscription", sub.user_id, buyer_id)?;
    if sub.payment_status.is_settled() {
      return Err(AppError::AlreadyProcessed(format!("Subscription {} is already paid", sub_id)));
    }
    if !matches!(sub.status, SubscriptionStatus::Pending | SubscriptionStatus::Processing) {
      return Err(AppError::Validation(format!(
        "A {} subscription cannot be paid for",
        sub.status.as_str()
      )));
    }
    ctx.update(|data| {
      data.amount_paise = sub.price_paise;
      data.subscription = Some(sub);
    });
    return Ok(PipelineControl::Continue);
  }

  let orders = store.get_orders(&target.order_ids).await?;
  let mut amount: i64 = 0;
  for id in &target.order_ids {
    let order = orders.iter().find(|o| o.id == *id).ok_or_else(|| not_found("Order", *id))?;
    ensure_owner("order", order.user_id, buyer_id)?;
    if order.payment_status.is_settled() {
      return Err(AppError::AlreadyProcessed(format!("Order {} is already paid", order.id)));
    }
    if order.payment_method == PaymentMethod::Cod {
      return Err(AppError::Validation(format!("Order {} is cash on delivery", order.id)));
    }
    if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
      return Err(AppError::Validation(format!(
        "Order {} is {} and cannot be paid for",
        order.id,
        order.status.as_str()
      )));
    }
    amount = amount
      .checked_add(order.outstanding_paise())
      .ok_or_else(|| AppError::Validation("Payment amount is too large".to_string()))?;
  }
  debug!(orders = orders.len(), amount, "Payment targets loaded.");
  ctx.update(|data| {
    data.amount_paise = amount;
    data.orders = orders;
  });
  Ok(PipelineControl::Continue)
}

/// Gives the session a new id plus the reference and QR payload derived from it.
fn assign_reference(session: &mut PaymentSession, policy: &StorePolicy, local_date: NaiveDate) -> AppResult<()> {
  session.id = Uuid::new_v4();
  session.reference_number = payment::reference_number(session.id, local_date);
  session.qr_payload =
    payment::upi_deep_link(&policy.upi_id, &policy.upi_name, session.total_amount_paise, &session.reference_number)?;
  Ok(())
}

async fn build_session(ctx: ContextData<CreatePaymentSessionCtxData>) -> AppResult<PipelineControl> {
  ctx.update(|data| {
    let policy = data.app_state.policy();
    let local_date = slots::local_today(data.now, policy.utc_offset);
    let mut session = PaymentSession {
      id: Uuid::nil(),
      reference_number: String::new(),
      user_id: data.buyer_id,
      order_ids: data.target.order_ids.clone(),
      subscription_id: data.target.subscription_id,
      total_amount_paise: data.amount_paise,
      upi_id: policy.upi_id.clone(),
      upi_name: policy.upi_name.clone(),
      qr_payload: String::new(),
      expires_at: data.now + policy.payment_session_ttl,
      verification_status: VerificationStatus::AwaitingSubmission,
      upi_transaction_id: None,
      upi_reference_number: None,
      submitted_at: None,
      verified_at: None,
      verified_by: None,
      rejection_reason: None,
      created_at: data.now,
    };
    assign_reference(&mut session, policy, local_date)?;
    data.session = Some(session);
    Ok(PipelineControl::Continue)
  })
}

#[instrument(name = "pipeline::payment::claim_and_persist", skip_all, err(Display))]
async fn claim_and_persist(ctx: ContextData<CreatePaymentSessionCtxData>) -> AppResult<PipelineControl> {
  let (store, mut session, now, policy) = {
    let guard = ctx.read();
    let session = guard
      .session
      .clone()
      .ok_or_else(|| AppError::Internal("Payment session was not built".to_string()))?;
    (guard.app_state.store.clone(), session, guard.now, guard.app_state.config.policy.clone())
  };
  let local_date = slots::local_today(now, policy.utc_offset);
  let mut attempt = 1;
  loop {
    match store.create_payment_session(&session, now).await {
      Ok(()) => break,
      Err(AppError::DuplicateReference(_)) if attempt < MAX_REFERENCE_ATTEMPTS => {
        debug!(attempt, reference = %session.reference_number, "Reference number taken; drawing another.");
        attempt += 1;
        assign_reference(&mut session, &policy, local_date)?;
      }
      Err(e) => {
        warn!(reference = %session.reference_number, error = %e, "Payment session not opened.");
        return Err(e);
      }
    }
  }
  info!(
    session_id = %session.id,
    reference = %session.reference_number,
    amount = %format_rupees(session.total_amount_paise),
    "Payment session opened."
  );
  ctx.write().session = Some(session);
  Ok(PipelineControl::Continue)
}

// --- Submit ---

fn submit_payment_pipeline() -> Pipeline<SubmitPaymentCtxData, AppError> {
  let mut p = Pipeline::from_steps(vec![
    StepDef::required("load_session"),
    StepDef::required("check_submission"),
    StepDef::required("record_submission"),
  ]);
  p.on_root("load_session", |ctx: ContextData<SubmitPaymentCtxData>| async move {
    let (store, id) = {
      let guard = ctx.read();
      (guard.app_state.store.clone(), guard.session_id)
    };
    let session = store.get_payment_session(id).await?.ok_or_else(|| not_found("Payment session", id))?;
    ctx.write().session = Some(session);
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("check_submission", check_submission);
  p.on_root("record_submission", record_submission);
  p
}

async fn check_submission(ctx: ContextData<SubmitPaymentCtxData>) -> AppResult<PipelineControl> {
  ctx.update(|data| {
    let now = data.now;
    let buyer_id = data.buyer_id;
    let transaction_id = payment::validate_transaction_id(&data.transaction_id);
    let reference = data.upi_reference_number.clone().map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let session = data
      .session
      .as_mut()
      .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
    ensure_owner("payment session", session.user_id, buyer_id)?;
    session.ensure_submittable(now)?;
    session.upi_transaction_id = Some(transaction_id?);
    session.upi_reference_number = reference;
    session.verification_status = VerificationStatus::Submitted;
    session.submitted_at = Some(now);
    Ok(PipelineControl::Continue)
  })
}

#[instrument(name = "pipeline::payment::record_submission", skip_all, err(Display))]
async fn record_submission(ctx: ContextData<SubmitPaymentCtxData>) -> AppResult<PipelineControl> {
  let (store, session, now) = {
    let guard = ctx.read();
    let session = guard
      .session
      .clone()
      .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
    (guard.app_state.store.clone(), session, guard.now)
  };
  if !store.record_submission(&session, now).await? {
    return Err(lost_race("Payment session", session.id));
  }
  info!(session_id = %session.id, reference = %session.reference_number, "Payment submitted for verification.");
  Ok(PipelineControl::Continue)
}

// --- Verify ---

fn is_approval(ctx: ContextData<VerifyPaymentCtxData>) -> bool {
  ctx.read().decision == VerificationDecision::Approve
}

fn verify_payment_pipeline() -> Pipeline<VerifyPaymentCtxData, AppError> {
  let mut p = Pipeline::from_steps(vec![
    StepDef::required("load_session"),
    StepDef::required("check_verifiable"),
    StepDef::required("approve_payment").skip_when(|ctx| !is_approval(ctx)),
    StepDef::required("reject_payment").skip_when(is_approval),
    StepDef::required("settle_payment"),
    StepDef::optional("notify_payment_outcome"),
  ]);
  p.on_root("load_session", |ctx: ContextData<VerifyPaymentCtxData>| async move {
    let (store, id) = {
      let guard = ctx.read();
      (guard.app_state.store.clone(), guard.session_id)
    };
    let session = store.get_payment_session(id).await?.ok_or_else(|| not_found("Payment session", id))?;
    ctx.write().session = Some(session);
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("check_verifiable", |ctx: ContextData<VerifyPaymentCtxData>| async move {
    let guard = ctx.read();
    let session = guard
      .session
      .as_ref()
      .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
    session.ensure_verifiable(guard.now)?;
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_root("approve_payment", |ctx: ContextData<VerifyPaymentCtxData>| async move {
    ctx.update(|data| {
      let (now, admin_id) = (data.now, data.admin_id);
      let session = data
        .session
        .as_mut()
        .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
      session.verification_status = VerificationStatus::Verified;
      session.verified_at = Some(now);
      session.verified_by = Some(admin_id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p.on_root("reject_payment", |ctx: ContextData<VerifyPaymentCtxData>| async move {
    ctx.update(|data| {
      let (now, admin_id) = (data.now, data.admin_id);
      let reason = data
        .reason
        .clone()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::Validation("A reason is required to reject a payment".to_string()))?;
      let session = data
        .session
        .as_mut()
        .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
      session.verification_status = VerificationStatus::Rejected;
      session.verified_at = Some(now);
      session.verified_by = Some(admin_id);
      session.rejection_reason = Some(reason);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p.on_root("settle_payment", settle_payment);
  p.on_root("notify_payment_outcome", notify_payment_outcome);
  p
}

#[instrument(name = "pipeline::payment::settle", skip_all, fields(decision), err(Display))]
async fn settle_payment(ctx: ContextData<VerifyPaymentCtxData>) -> AppResult<PipelineControl> {
  let (store, session, decision, now) = {
    let guard = ctx.read();
    let session = guard
      .session
      .clone()
      .ok_or_else(|| AppError::Internal("Payment session was not loaded".to_string()))?;
    (guard.app_state.store.clone(), session, guard.decision, guard.now)
  };
  tracing::Span::current().record("decision", tracing::field::debug(decision));
  if !store.settle_payment(&session, decision, now).await? {
    return Err(lost_race("Payment session", session.id));
  }
  info!(
    session_id = %session.id,
    reference = %session.reference_number,
    orders = session.order_ids.len(),
    subscription = ?session.subscription_id,
    "Payment decision recorded."
  );
  Ok(PipelineControl::Continue)
}

async fn notify_payment_outcome(ctx: ContextData<VerifyPaymentCtxData>) -> AppResult<PipelineControl> {
  let (app_state, session) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.session.clone())
  };
  let Some(session) = session else {
    return Ok(PipelineControl::Continue);
  };
  let (subject, body) = match session.verification_status {
    VerificationStatus::Verified => (
      format!("Payment {} received", session.reference_number),
      format!("We received Rs {}. Thank you!", format_rupees(session.total_amount_paise)),
    ),
    _ => (
      format!("Payment {} could not be verified", session.reference_number),
      format!(
        "Reason: {}. Please start a new payment.",
        session.rejection_reason.as_deref().unwrap_or("not given")
      ),
    ),
  };
  common_steps::notify_user(&app_state, session.user_id, subject, body).await?;
  ctx.write().notified = true;
  Ok(PipelineControl::Continue)
}
