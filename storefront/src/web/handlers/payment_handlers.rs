// dairy_storefront/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use milkflow::ContextData;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{run_workflow, take_result};
use crate::errors::AppError;
use crate::models::PaymentSession;
use crate::pipelines::common_steps::{ensure_owner, not_found};
use crate::pipelines::contexts::{CreatePaymentSessionCtxData, PaymentTargetInput, SubmitPaymentCtxData};
use crate::services::auth_service::{Identity, Role};
use crate::state::AppState;

/// Session with its status as of `now` (lazy expiry applied) and the time left.
pub(crate) fn session_view(session: &PaymentSession, now: DateTime<Utc>) -> Value {
  json!({
    "session": session,
    "status": session.state_at(now),
    "secondsRemaining": session.seconds_remaining(now),
  })
}

fn with_envelope(mut body: Value, message: &str) -> Value {
  if let Some(map) = body.as_object_mut() {
    map.insert("success".to_string(), Value::Bool(true));
    map.insert("message".to_string(), Value::String(message.to_string()));
  }
  body
}

#[instrument(name = "handler::create_payment_session", skip(app_state, identity, body), fields(user_id = %identity.user_id))]
pub async fn create_payment_session_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<PaymentTargetInput>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let ctx = ContextData::new(CreatePaymentSessionCtxData::new(
    app_state.get_ref().clone(),
    identity.user_id,
    body.into_inner(),
  ));
  run_workflow(&app_state, ctx.clone()).await?;

  let now = ctx.read().now;
  let session = take_result(&ctx, |data| data.session.take())?;
  info!(session_id = %session.id, reference = %session.reference_number, "Payment session created.");
  Ok(HttpResponse::Created().json(with_envelope(session_view(&session, now), "Payment session created.")))
}

#[instrument(name = "handler::get_payment_session", skip(app_state, identity, path), fields(session_id = %path.as_ref()))]
pub async fn get_payment_session_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let session_id = path.into_inner();
  let session = app_state
    .store
    .get_payment_session(session_id)
    .await?
    .ok_or_else(|| not_found("Payment session", session_id))?;
  if !identity.is_admin() {
    identity.require(Role::Buyer)?;
    ensure_owner("payment session", session.user_id, identity.user_id)?;
  }
  Ok(HttpResponse::Ok().json(with_envelope(session_view(&session, app_state.now()), "Payment session fetched.")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitPaymentRequest {
  pub upi_transaction_id: String,
  #[serde(default)]
  pub upi_reference_number: Option<String>,
}

#[instrument(name = "handler::submit_payment", skip(app_state, identity, path, body), fields(session_id = %path.as_ref()))]
pub async fn submit_payment_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<SubmitPaymentRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Buyer)?;
  let req = body.into_inner();
  let ctx = ContextData::new(SubmitPaymentCtxData::new(
    app_state.get_ref().clone(),
    identity.user_id,
    path.into_inner(),
    req.upi_transaction_id,
    req.upi_reference_number,
  ));
  run_workflow(&app_state, ctx.clone()).await?;

  let now = ctx.read().now;
  let session = take_result(&ctx, |data| data.session.take())?;
  Ok(HttpResponse::Ok().json(with_envelope(
    session_view(&session, now),
    "Payment submitted. We will confirm it shortly.",
  )))
}
