// dairy_storefront/src/models/refund.rs

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "refund_status_enum", rename_all = "snake_case")]
pub enum RefundStatus {
  Pending,
  Approved,
  Processed,
  Rejected,
}

impl RefundStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      RefundStatus::Pending => "pending",
      RefundStatus::Approved => "approved",
      RefundStatus::Processed => "processed",
      RefundStatus::Rejected => "rejected",
    }
  }

  pub fn is_open(self) -> bool {
    matches!(self, RefundStatus::Pending | RefundStatus::Approved)
  }

  pub fn can_transition_to(self, next: RefundStatus) -> bool {
    use RefundStatus::*;
    matches!(
      (self, next),
      (Pending, Approved) | (Pending, Rejected) | (Approved, Processed) | (Approved, Rejected)
    )
  }
}

/// Where the money goes back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RefundDetails {
  Upi {
    #[serde(rename = "upiId")]
    upi_id: String,
  },
  BankAccount {
    #[serde(rename = "accountHolderName")]
    account_holder_name: String,
    #[serde(rename = "accountNumber")]
    account_number: String,
    #[serde(rename = "ifscCode")]
    ifsc_code: String,
    #[serde(rename = "bankName")]
    bank_name: String,
  },
}

impl RefundDetails {
  pub fn validate(&self) -> Result<()> {
    match self {
      RefundDetails::Upi { upi_id } => {
        let mut parts = upi_id.trim().splitn(2, '@');
        let handle = parts.next().unwrap_or_default();
        let provider = parts.next().unwrap_or_default();
        if handle.is_empty() || provider.is_empty() {
          return Err(AppError::Validation("UPI id must look like name@bank".to_string()));
        }
      }
      RefundDetails::BankAccount { account_holder_name, account_number, ifsc_code, bank_name } => {
        if account_holder_name.trim().is_empty() || bank_name.trim().is_empty() {
          return Err(AppError::Validation("Account holder and bank name are required".to_string()));
        }
        if !(9..=18).contains(&account_number.len()) || !account_number.chars().all(|c| c.is_ascii_digit()) {
          return Err(AppError::Validation("Account number must be 9-18 digits".to_string()));
        }
        if ifsc_code.len() != 11 || !ifsc_code.chars().all(|c| c.is_ascii_alphanumeric()) {
          return Err(AppError::Validation("IFSC code must be 11 characters".to_string()));
        }
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RefundTarget {
  Order(Uuid),
  Subscription(Uuid),
}

impl RefundTarget {
  pub fn id(self) -> Uuid {
    match self {
      RefundTarget::Order(id) | RefundTarget::Subscription(id) => id,
    }
  }
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
  pub id: Uuid,
  pub user_id: Uuid,
  pub order_id: Option<Uuid>,
  pub subscription_id: Option<Uuid>,
  pub amount_paise: i64,
  pub reason: String,
  pub refund_details: Json<RefundDetails>,
  pub status: RefundStatus,
  pub admin_notes: Option<String>,
  pub resolved_by: Option<Uuid>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl RefundRequest {
  pub fn target(&self) -> Option<RefundTarget> {
    match (self.order_id, self.subscription_id) {
      (Some(id), None) => Some(RefundTarget::Order(id)),
      (None, Some(id)) => Some(RefundTarget::Subscription(id)),
      _ => None,
    }
  }

  pub fn resolve(&mut self, next: RefundStatus, admin_id: Uuid, notes: Option<String>, now: DateTime<Utc>) -> Result<()> {
    if !self.status.can_transition_to(next) {
      return Err(AppError::IllegalTransition(format!(
        "Refund cannot move from {} to {}",
        self.status.as_str(),
        next.as_str()
      )));
    }
    self.status = next;
    self.resolved_by = Some(admin_id);
    if notes.is_some() {
      self.admin_notes = notes;
    }
    if !next.is_open() {
      self.resolved_at = Some(now);
    }
    self.updated_at = now;
    Ok(())
  }
}
