// dairy_storefront/src/models/payment.rs

use crate::errors::{AppError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

/// Stored verification state. `expired` is never stored; see [`PaymentSession::state_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "verification_status_enum", rename_all = "snake_case")]
pub enum VerificationStatus {
  AwaitingSubmission,
  Submitted,
  Verified,
  Rejected,
}

impl VerificationStatus {
  pub fn is_final(self) -> bool {
    matches!(self, VerificationStatus::Verified | VerificationStatus::Rejected)
  }
}

/// Status as seen at a given instant, with lazy expiry applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
  AwaitingSubmission,
  Submitted,
  Verified,
  Rejected,
  Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
  Approve,
  Reject,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
  pub id: Uuid,
  pub reference_number: String,
  pub user_id: Uuid,
  pub order_ids: Vec<Uuid>,
  pub subscription_id: Option<Uuid>,
  pub total_amount_paise: i64,
  pub upi_id: String,
  pub upi_name: String,
  pub qr_payload: String,
  pub expires_at: DateTime<Utc>,
  pub verification_status: VerificationStatus,
  pub upi_transaction_id: Option<String>,
  pub upi_reference_number: Option<String>,
  pub submitted_at: Option<DateTime<Utc>>,
  pub verified_at: Option<DateTime<Utc>>,
  pub verified_by: Option<Uuid>,
  pub rejection_reason: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl PaymentSession {
  /// Ids of every order or subscription this session collects money for.
  pub fn targets(&self) -> Vec<Uuid> {
    let mut ids = self.order_ids.clone();
    ids.extend(self.subscription_id);
    ids
  }

  /// Expired once `now` is past `expires_at` without a final decision.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now > self.expires_at && !self.verification_status.is_final()
  }

  pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
    if self.is_expired(now) {
      return SessionState::Expired;
    }
    match self.verification_status {
      VerificationStatus::AwaitingSubmission => SessionState::AwaitingSubmission,
      VerificationStatus::Submitted => SessionState::Submitted,
      VerificationStatus::Verified => SessionState::Verified,
      VerificationStatus::Rejected => SessionState::Rejected,
    }
  }

  pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
    (self.expires_at - now).num_seconds().max(0)
  }

  /// Gate for buyer submission. Expiry wins over every other state.
  pub fn ensure_submittable(&self, now: DateTime<Utc>) -> Result<()> {
    if now > self.expires_at {
      return Err(AppError::SessionExpired(format!(
        "Payment session {} expired at {}; start a new payment",
        self.reference_number, self.expires_at
      )));
    }
    if self.verification_status.is_final() {
      return Err(AppError::AlreadyProcessed(format!(
        "Payment session {} has already been {}",
        self.reference_number,
        self.status_label()
      )));
    }
    Ok(())
  }

  /// Gate for admin verification: only a live, submitted session can be decided.
  pub fn ensure_verifiable(&self, now: DateTime<Utc>) -> Result<()> {
    if self.verification_status.is_final() {
      return Err(AppError::AlreadyProcessed(format!(
        "Payment session {} has already been {}",
        self.reference_number,
        self.status_label()
      )));
    }
    if self.is_expired(now) {
      return Err(AppError::SessionExpired(format!(
        "Payment session {} expired before verification",
        self.reference_number
      )));
    }
    if self.verification_status != VerificationStatus::Submitted {
      return Err(AppError::IllegalTransition(format!(
        "Payment session {} has no submitted transaction to verify",
        self.reference_number
      )));
    }
    Ok(())
  }

  fn status_label(&self) -> &'static str {
    match self.verification_status {
      VerificationStatus::AwaitingSubmission => "awaiting submission",
      VerificationStatus::Submitted => "submitted",
      VerificationStatus::Verified => "verified",
      VerificationStatus::Rejected => "rejected",
    }
  }
}

/// `DF` + local date + first 8 hex digits of the session id, upper-cased.
pub fn reference_number(session_id: Uuid, local_date: NaiveDate) -> String {
  let simple = session_id.simple().to_string();
  format!("DF{}{}", local_date.format("%Y%m%d"), simple[..8].to_ascii_uppercase())
}

pub fn format_rupees(amount_paise: i64) -> String {
  let sign = if amount_paise < 0 { "-" } else { "" };
  let abs = amount_paise.unsigned_abs();
  format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[derive(Serialize)]
struct UpiLinkParams<'a> {
  pa: &'a str,
  pn: &'a str,
  am: String,
  cu: &'static str,
  tn: String,
  tr: &'a str,
}

/// UPI deep link rendered client-side as a QR code.
pub fn upi_deep_link(upi_id: &str, upi_name: &str, amount_paise: i64, reference: &str) -> Result<String> {
  let params = UpiLinkParams {
    pa: upi_id,
    pn: upi_name,
    am: format_rupees(amount_paise),
    cu: "INR",
    tn: format!("Order {}", reference),
    tr: reference,
  };
  let query = serde_urlencoded::to_string(&params)
    .map_err(|e| AppError::Internal(format!("Could not encode UPI link: {}", e)))?;
  Ok(format!("upi://pay?{}", query))
}

/// Buyer-supplied UPI transaction ids are 6-64 ASCII alphanumerics.
pub fn validate_transaction_id(raw: &str) -> Result<String> {
  let trimmed = raw.trim();
  if !(6..=64).contains(&trimmed.len()) || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
    return Err(AppError::Validation(
      "UPI transaction id must be 6-64 letters or digits".to_string(),
    ));
  }
  Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  fn session(status: VerificationStatus, expires_at: DateTime<Utc>) -> PaymentSession {
    PaymentSession {
      id: Uuid::new_v4(),
      reference_number: "DF20250101ABCDEF12".into(),
      user_id: Uuid::new_v4(),
      order_ids: vec![Uuid::new_v4()],
      subscription_id: None,
      total_amount_paise: 45_000,
      upi_id: "dairy@upi".into(),
      upi_name: "Dairy Farm".into(),
      qr_payload: String::new(),
      expires_at,
      verification_status: status,
      upi_transaction_id: None,
      upi_reference_number: None,
      submitted_at: None,
      verified_at: None,
      verified_by: None,
      rejection_reason: None,
      created_at: expires_at - Duration::seconds(900),
    }
  }

  #[test]
  fn expiry_overrides_open_states_only() {
    let expires = Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 0).unwrap();
    let later = expires + Duration::seconds(1);
    assert_eq!(session(VerificationStatus::Submitted, expires).state_at(later), SessionState::Expired);
    assert_eq!(session(VerificationStatus::Submitted, expires).state_at(expires), SessionState::Submitted);
    assert_eq!(session(VerificationStatus::Verified, expires).state_at(later), SessionState::Verified);
  }

  #[test]
  fn submit_after_expiry_reports_expired_even_when_rejected() {
    let expires = Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 0).unwrap();
    let s = session(VerificationStatus::Rejected, expires);
    assert!(matches!(s.ensure_submittable(expires + Duration::seconds(901)), Err(AppError::SessionExpired(_))));
    assert!(matches!(s.ensure_submittable(expires), Err(AppError::AlreadyProcessed(_))));
  }

  #[test]
  fn verify_requires_submission() {
    let expires = Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 0).unwrap();
    let now = expires - Duration::seconds(60);
    let s = session(VerificationStatus::AwaitingSubmission, expires);
    assert!(matches!(s.ensure_verifiable(now), Err(AppError::IllegalTransition(_))));
    assert!(session(VerificationStatus::Submitted, expires).ensure_verifiable(now).is_ok());
  }

  #[test]
  fn deep_link_carries_amount_and_reference() {
    let link = upi_deep_link("dairy@upi", "Dairy Farm", 45_050, "DF20250101ABCDEF12").unwrap();
    assert!(link.starts_with("upi://pay?pa=dairy%40upi&pn=Dairy+Farm&am=450.50&cu=INR"));
    assert!(link.ends_with("&tr=DF20250101ABCDEF12"));
  }

  #[test]
  fn reference_number_shape() {
    let id = Uuid::parse_str("0a1b2c3d-0000-4000-8000-000000000000").unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
    assert_eq!(reference_number(id, date), "DF202503090A1B2C3D");
  }

  #[test]
  fn transaction_id_rules() {
    assert_eq!(validate_transaction_id(" 412345678901 ").unwrap(), "412345678901");
    assert!(validate_transaction_id("abc").is_err());
    assert!(validate_transaction_id("4123-4567").is_err());
  }
}
