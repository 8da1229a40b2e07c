// dairy_storefront/src/pipelines/common_steps.rs

//! Helpers shared by several pipelines.

use crate::errors::{AppError, Result as AppResult};
use crate::services::notify::Notification;
use crate::state::AppState;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Sends a notification through the configured notifier. Used from optional
/// steps, so an error here is logged by the engine and the pipeline carries on.
#[instrument(name = "common_step::notify", skip(app_state, body), fields(to = %recipient), err(Display))]
pub async fn notify_user(app_state: &AppState, recipient: Uuid, subject: String, body: String) -> AppResult<()> {
  let notification = Notification { recipient_user_id: recipient, subject, body };
  match app_state.notifier.send(&notification).await {
    Ok(receipt) => {
      info!(message_id = %receipt.message_id, "Notification sent.");
      Ok(())
    }
    Err(e) => {
      warn!(error = %e, "Notification failed.");
      Err(e)
    }
  }
}

/// `NotFound` for a missing record of `kind`.
pub fn not_found(kind: &str, id: Uuid) -> AppError {
  AppError::NotFound(format!("{} {} not found", kind, id))
}

/// Buyers may only act on their own records.
pub fn ensure_owner(kind: &str, owner: Uuid, caller: Uuid) -> AppResult<()> {
  if owner == caller {
    Ok(())
  } else {
    warn!(%owner, %caller, "Caller does not own the {}.", kind);
    Err(AppError::Forbidden(format!("This {} belongs to another account", kind)))
  }
}

/// Error for a conditional write that lost to a concurrent change.
pub fn lost_race(kind: &str, id: Uuid) -> AppError {
  AppError::IllegalTransition(format!("{} {} was changed concurrently; reload and retry", kind, id))
}
