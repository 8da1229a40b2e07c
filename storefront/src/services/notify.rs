// dairy_storefront/src/services/notify.rs

//! Best-effort customer notifications.
//!
//! Delivery providers are not wired in; the default notifier logs the message.
//! Pipelines call notifiers from optional steps, so a failure here never fails
//! the business operation.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub recipient_user_id: Uuid,
  pub subject: String,
  pub body: String,
}

#[derive(Debug, Clone)]
pub struct NotificationReceipt {
  pub message_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn send(&self, notification: &Notification) -> Result<NotificationReceipt>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone)]
pub struct LogNotifier {
  pub sender: String,
}

#[async_trait]
impl Notifier for LogNotifier {
  #[instrument(name = "notify::send", skip_all, fields(to = %notification.recipient_user_id, subject = %notification.subject))]
  async fn send(&self, notification: &Notification) -> Result<NotificationReceipt> {
    if notification.subject.trim().is_empty() {
      return Err(AppError::Internal("Notification subject is empty".to_string()));
    }
    let message_id = format!("log_{}", Uuid::new_v4().simple());
    let preview: String = notification.body.chars().take(60).collect();
    info!(from = %self.sender, %message_id, %preview, "Notification recorded.");
    Ok(NotificationReceipt { message_id })
  }
}
