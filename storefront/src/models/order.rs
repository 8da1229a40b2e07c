// dairy_storefront/src/models/order.rs

use crate::config::StorePolicy;
use crate::errors::{AppError, Result};
use crate::services::slots;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "delivery_shift_enum", rename_all = "snake_case")]
pub enum DeliveryShift {
  Morning,
  /// Kept so stored records and clients can name it; never offered as available.
  Evening,
}

impl DeliveryShift {
  pub const ALL: [DeliveryShift; 2] = [DeliveryShift::Morning, DeliveryShift::Evening];

  pub fn as_str(self) -> &'static str {
    match self {
      DeliveryShift::Morning => "morning",
      DeliveryShift::Evening => "evening",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status_enum", rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Confirmed => "confirmed",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (self, next),
      (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Delivered) | (Confirmed, Cancelled)
    )
  }
}

pub fn validate_order_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
  if from.can_transition_to(to) {
    Ok(())
  } else {
    Err(AppError::IllegalTransition(format!(
      "Order cannot move from {} to {}",
      from.as_str(),
      to.as_str()
    )))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status_enum", rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Paid,
  /// Buyer submitted a UPI transaction id that an admin has not reviewed yet.
  Processing,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Processing => "processing",
      PaymentStatus::Failed => "failed",
      PaymentStatus::Refunded => "refunded",
    }
  }

  /// Money has been received (and possibly returned) for this target.
  pub fn is_settled(self) -> bool {
    matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_method_enum", rename_all = "snake_case")]
pub enum PaymentMethod {
  Cod,
  Upi,
  Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "cancelled_by_enum", rename_all = "snake_case")]
pub enum CancelledBy {
  User,
  Admin,
}

/// Product snapshot taken at checkout. Later catalog edits do not touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
  pub product_id: Uuid,
  pub name: String,
  pub unit: String,
  pub unit_price_paise: i64,
  pub quantity: i32,
}

impl LineItem {
  pub fn line_total_paise(&self) -> Option<i64> {
    self.unit_price_paise.checked_mul(i64::from(self.quantity))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
  pub name: String,
  pub address: String,
  pub city: String,
  pub state: String,
  pub zip_code: String,
  pub phone: String,
}

impl ShippingAddress {
  pub fn validate(&self) -> Result<()> {
    let fields = [
      ("name", &self.name),
      ("address", &self.address),
      ("city", &self.city),
      ("state", &self.state),
      ("zipCode", &self.zip_code),
    ];
    if let Some((field, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
      return Err(AppError::Validation(format!("Shipping address field '{}' is required", field)));
    }
    let digits: String = self.phone.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = digits.strip_prefix("+91").unwrap_or(&digits);
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
      return Err(AppError::Validation("Phone number must have 10 digits".to_string()));
    }
    if self.zip_code.trim().len() != 6 || !self.zip_code.trim().chars().all(|c| c.is_ascii_digit()) {
      return Err(AppError::Validation("PIN code must have 6 digits".to_string()));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub items: Json<Vec<LineItem>>,
  pub shipping_address: Json<ShippingAddress>,
  pub subtotal_paise: i64,
  pub shipping_fee_paise: i64,
  pub tax_paise: i64,
  pub discount_paise: i64,
  /// Fixed at creation: subtotal + shipping + tax - discount.
  pub total_amount_paise: i64,
  pub delivery_shift: DeliveryShift,
  pub delivery_date: NaiveDate,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub payment_method: PaymentMethod,
  pub notes: Option<String>,
  pub cancellation_reason: Option<String>,
  pub cancelled_by: Option<CancelledBy>,
  pub delivery_person_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub confirmed_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub cancelled_at: Option<DateTime<Utc>>,
  pub updated_at: DateTime<Utc>,
  /// Row version as loaded. Stores bump it on every write.
  #[serde(skip)]
  pub version: i32,
}

impl Order {
  pub fn cancellation_cutoff(&self, policy: &StorePolicy) -> DateTime<Utc> {
    slots::cutoff_for(self.delivery_date, policy.utc_offset)
  }

  /// Cancellable while pending or confirmed and the delivery slot's cutoff has not passed.
  pub fn can_be_cancelled(&self, now: DateTime<Utc>, policy: &StorePolicy) -> bool {
    matches!(self.status, OrderStatus::Pending | OrderStatus::Confirmed) && now <= self.cancellation_cutoff(policy)
  }

  /// Moves the order to `next`, stamping the matching timestamp. Cancellation
  /// additionally requires `can_be_cancelled`.
  pub fn apply_transition(
    &mut self,
    next: OrderStatus,
    now: DateTime<Utc>,
    policy: &StorePolicy,
    cancelled_by: CancelledBy,
    reason: Option<String>,
  ) -> Result<()> {
    validate_order_transition(self.status, next)?;
    match next {
      OrderStatus::Confirmed => self.confirmed_at = Some(now),
      OrderStatus::Delivered => {
        self.delivered_at = Some(now);
        if self.payment_method == PaymentMethod::Cod && !self.payment_status.is_settled() {
          self.payment_status = PaymentStatus::Paid;
        }
      }
      OrderStatus::Cancelled => {
        if !self.can_be_cancelled(now, policy) {
          return Err(AppError::IllegalTransition(format!(
            "Order {} can no longer be cancelled; the cutoff for {} has passed",
            self.id, self.delivery_date
          )));
        }
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(cancelled_by);
        self.cancellation_reason = reason;
      }
      OrderStatus::Pending => {}
    }
    self.status = next;
    self.updated_at = now;
    Ok(())
  }

  pub fn outstanding_paise(&self) -> i64 {
    if self.payment_status.is_settled() {
      0
    } else {
      self.total_amount_paise
    }
  }
}
