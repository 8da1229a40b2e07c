// dairy_storefront/src/models/subscription.rs

use crate::config::StorePolicy;
use crate::errors::{AppError, Result};
use crate::models::order::{DeliveryShift, PaymentStatus, ShippingAddress};
use crate::services::slots;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

pub const ALLOWED_DURATIONS: [i32; 3] = [7, 15, 30];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "milk_type_enum", rename_all = "snake_case")]
pub enum MilkType {
  Cow,
  Buffalo,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
  pub id: Uuid,
  pub name: String,
  pub milk_type: MilkType,
  pub volume: String,
  pub duration_days: i32,
  pub price_paise: i64,
  pub original_price_paise: i64,
  pub daily_price_paise: i64,
  pub discount_percent: i32,
  pub features: Json<Vec<String>>,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
  /// Checks the editable fields and recomputes the derived prices.
  pub fn normalize(&mut self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(AppError::Validation("Plan name is required".to_string()));
    }
    if self.volume.trim().is_empty() {
      return Err(AppError::Validation("Plan volume is required".to_string()));
    }
    if !ALLOWED_DURATIONS.contains(&self.duration_days) {
      return Err(AppError::Validation(format!(
        "Plan duration must be one of {:?} days",
        ALLOWED_DURATIONS
      )));
    }
    if self.price_paise <= 0 {
      return Err(AppError::Validation("Plan price must be positive".to_string()));
    }
    if self.original_price_paise < self.price_paise {
      return Err(AppError::Validation("Original price cannot be below the plan price".to_string()));
    }
    let days = i64::from(self.duration_days);
    self.daily_price_paise = (self.price_paise + days / 2) / days;
    let saved = self.original_price_paise - self.price_paise;
    self.discount_percent = ((saved * 100 + self.original_price_paise / 2) / self.original_price_paise) as i32;
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "subscription_status_enum", rename_all = "snake_case")]
pub enum SubscriptionStatus {
  Pending,
  Processing,
  Active,
  Paused,
  CancellationRequested,
  Cancelled,
  Completed,
  Expired,
}

impl SubscriptionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      SubscriptionStatus::Pending => "pending",
      SubscriptionStatus::Processing => "processing",
      SubscriptionStatus::Active => "active",
      SubscriptionStatus::Paused => "paused",
      SubscriptionStatus::CancellationRequested => "cancellation_requested",
      SubscriptionStatus::Cancelled => "cancelled",
      SubscriptionStatus::Completed => "completed",
      SubscriptionStatus::Expired => "expired",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      SubscriptionStatus::Cancelled | SubscriptionStatus::Completed | SubscriptionStatus::Expired
    )
  }

  pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
    use SubscriptionStatus::*;
    match self {
      Pending => matches!(next, Processing | Active | Cancelled),
      Processing => matches!(next, Active | Pending | Cancelled),
      Active => matches!(next, Paused | CancellationRequested | Completed | Expired | Cancelled),
      Paused => matches!(next, Active | CancellationRequested | Cancelled | Expired),
      CancellationRequested => matches!(next, Cancelled | Active),
      Cancelled | Completed | Expired => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
  Delivered,
  Skipped,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
  pub id: Uuid,
  pub user_id: Uuid,
  pub plan_id: Uuid,
  pub plan_name: String,
  pub price_paise: i64,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  pub next_delivery_date: NaiveDate,
  pub total_deliveries: i32,
  pub completed_deliveries: i32,
  pub skipped_deliveries: i32,
  pub status: SubscriptionStatus,
  pub payment_status: PaymentStatus,
  pub delivery_address: Json<ShippingAddress>,
  pub preferred_delivery_time: DeliveryShift,
  /// Latest payment session opened for this subscription.
  pub payment_id: Option<Uuid>,
  pub cancellation_reason: Option<String>,
  pub paused_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(skip)]
  pub version: i32,
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
  let days = days.max(0) as u64;
  date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

impl UserSubscription {
  pub fn new_pending(
    plan: &SubscriptionPlan,
    user_id: Uuid,
    start_date: NaiveDate,
    address: ShippingAddress,
    shift: DeliveryShift,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id,
      plan_id: plan.id,
      plan_name: plan.name.clone(),
      price_paise: plan.price_paise,
      start_date,
      end_date: add_days(start_date, i64::from(plan.duration_days) - 1),
      next_delivery_date: start_date,
      total_deliveries: plan.duration_days,
      completed_deliveries: 0,
      skipped_deliveries: 0,
      status: SubscriptionStatus::Pending,
      payment_status: PaymentStatus::Pending,
      delivery_address: Json(address),
      preferred_delivery_time: shift,
      payment_id: None,
      cancellation_reason: None,
      paused_at: None,
      created_at: now,
      updated_at: now,
      version: 0,
    }
  }

  pub fn remaining_deliveries(&self) -> i32 {
    (self.total_deliveries - self.completed_deliveries - self.skipped_deliveries).max(0)
  }

  /// Status with lazy expiry applied: an active or paused plan past its end date reads as expired.
  pub fn effective_status(&self, today: NaiveDate) -> SubscriptionStatus {
    match self.status {
      SubscriptionStatus::Active | SubscriptionStatus::Paused if today > self.end_date => SubscriptionStatus::Expired,
      other => other,
    }
  }

  /// Applies lazy expiry in place. Returns true when the stored status changed.
  pub fn settle_expiry(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
    let effective = self.effective_status(today);
    if effective != self.status {
      self.status = effective;
      self.updated_at = now;
      return true;
    }
    false
  }

  pub fn transition(&mut self, next: SubscriptionStatus, now: DateTime<Utc>) -> Result<()> {
    if !self.status.can_transition_to(next) {
      return Err(AppError::IllegalTransition(format!(
        "Subscription cannot move from {} to {}",
        self.status.as_str(),
        next.as_str()
      )));
    }
    self.status = next;
    self.updated_at = now;
    Ok(())
  }

  /// Buyer cancellation: unpaid plans cancel outright, running plans need admin approval.
  pub fn request_cancellation(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
    let next = match self.status {
      SubscriptionStatus::Pending | SubscriptionStatus::Processing if !self.payment_status.is_settled() => {
        SubscriptionStatus::Cancelled
      }
      SubscriptionStatus::Active | SubscriptionStatus::Paused => SubscriptionStatus::CancellationRequested,
      other => {
        return Err(AppError::IllegalTransition(format!(
          "A {} subscription cannot be cancelled",
          other.as_str()
        )))
      }
    };
    self.transition(next, now)?;
    self.cancellation_reason = reason;
    Ok(())
  }

  pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
    if self.status != SubscriptionStatus::Active {
      return Err(AppError::IllegalTransition(format!(
        "Only active subscriptions can be paused (currently {})",
        self.status.as_str()
      )));
    }
    self.transition(SubscriptionStatus::Paused, now)?;
    self.paused_at = Some(now);
    Ok(())
  }

  /// Resumes a paused plan. Deliveries restart on the first orderable date at or
  /// after the previous next date; the end date shifts to fit the remaining deliveries.
  pub fn resume(&mut self, now: DateTime<Utc>, policy: &StorePolicy) -> Result<()> {
    if self.status != SubscriptionStatus::Paused {
      return Err(AppError::IllegalTransition(format!(
        "Only paused subscriptions can be resumed (currently {})",
        self.status.as_str()
      )));
    }
    let earliest = slots::earliest_orderable_date(now, policy);
    let next = self.next_delivery_date.max(earliest);
    self.transition(SubscriptionStatus::Active, now)?;
    self.next_delivery_date = next;
    self.end_date = add_days(next, i64::from(self.remaining_deliveries()) - 1).max(next);
    self.paused_at = None;
    Ok(())
  }

  /// Admin decision on a pending cancellation request.
  pub fn resolve_cancellation(&mut self, approve: bool, now: DateTime<Utc>) -> Result<()> {
    if self.status != SubscriptionStatus::CancellationRequested {
      return Err(AppError::IllegalTransition(format!(
        "Subscription has no pending cancellation request (currently {})",
        self.status.as_str()
      )));
    }
    let next = if approve {
      SubscriptionStatus::Cancelled
    } else {
      self.cancellation_reason = None;
      SubscriptionStatus::Active
    };
    self.transition(next, now)
  }

  /// Counts one delivery day. Counters never exceed the plan total.
  pub fn record_delivery(&mut self, outcome: DeliveryOutcome, now: DateTime<Utc>) -> Result<()> {
    if self.status != SubscriptionStatus::Active {
      return Err(AppError::IllegalTransition(format!(
        "Deliveries can only be recorded for active subscriptions (currently {})",
        self.status.as_str()
      )));
    }
    if self.remaining_deliveries() == 0 {
      return Err(AppError::IllegalTransition("All deliveries have already been recorded".to_string()));
    }
    match outcome {
      DeliveryOutcome::Delivered => self.completed_deliveries += 1,
      DeliveryOutcome::Skipped => self.skipped_deliveries += 1,
    }
    self.next_delivery_date = add_days(self.next_delivery_date, 1);
    self.updated_at = now;
    if self.remaining_deliveries() == 0 {
      self.transition(SubscriptionStatus::Completed, now)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn plan() -> SubscriptionPlan {
    let now = Utc::now();
    SubscriptionPlan {
      id: Uuid::new_v4(),
      name: "Cow Milk 1L".into(),
      milk_type: MilkType::Cow,
      volume: "1 L".into(),
      duration_days: 7,
      price_paise: 42_000,
      original_price_paise: 45_500,
      daily_price_paise: 0,
      discount_percent: 0,
      features: Json(vec!["Morning delivery".into()]),
      is_active: true,
      created_at: now,
      updated_at: now,
    }
  }

  fn address() -> ShippingAddress {
    ShippingAddress {
      name: "Ravi".into(),
      address: "4 Lake View".into(),
      city: "Nashik".into(),
      state: "MH".into(),
      zip_code: "422001".into(),
      phone: "9876543210".into(),
    }
  }

  #[test]
  fn plan_pricing_is_derived() {
    let mut p = plan();
    p.normalize().unwrap();
    assert_eq!(p.daily_price_paise, 6_000);
    assert_eq!(p.discount_percent, 8);

    p.duration_days = 10;
    assert!(matches!(p.normalize(), Err(AppError::Validation(_))));
  }

  #[test]
  fn transition_table() {
    use SubscriptionStatus::*;
    assert!(Pending.can_transition_to(Processing));
    assert!(Processing.can_transition_to(Pending));
    assert!(Active.can_transition_to(Paused));
    assert!(CancellationRequested.can_transition_to(Active));
    assert!(!Paused.can_transition_to(Completed));
    assert!(!Pending.can_transition_to(Paused));
    for terminal in [Cancelled, Completed, Expired] {
      assert!(terminal.is_terminal());
      assert!(!terminal.can_transition_to(Active));
    }
  }

  #[test]
  fn deliveries_complete_the_plan() {
    let now = Utc.with_ymd_and_hms(2025, 5, 1, 6, 0, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let mut sub = UserSubscription::new_pending(&plan(), Uuid::new_v4(), start, address(), DeliveryShift::Morning, now);
    assert_eq!(sub.end_date, NaiveDate::from_ymd_opt(2025, 5, 8).unwrap());
    sub.status = SubscriptionStatus::Active;
    for i in 0..7 {
      let outcome = if i == 3 { DeliveryOutcome::Skipped } else { DeliveryOutcome::Delivered };
      sub.record_delivery(outcome, now).unwrap();
    }
    assert_eq!(sub.status, SubscriptionStatus::Completed);
    assert_eq!((sub.completed_deliveries, sub.skipped_deliveries), (6, 1));
    assert!(sub.record_delivery(DeliveryOutcome::Delivered, now).is_err());
  }

  #[test]
  fn cancellation_depends_on_payment() {
    let now = Utc.with_ymd_and_hms(2025, 5, 1, 6, 0, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let mut sub = UserSubscription::new_pending(&plan(), Uuid::new_v4(), start, address(), DeliveryShift::Morning, now);
    let mut running = sub.clone();

    sub.request_cancellation(None, now).unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);

    running.status = SubscriptionStatus::Active;
    running.payment_status = PaymentStatus::Paid;
    running.request_cancellation(Some("moving".into()), now).unwrap();
    assert_eq!(running.status, SubscriptionStatus::CancellationRequested);
    running.resolve_cancellation(false, now).unwrap();
    assert_eq!(running.status, SubscriptionStatus::Active);
  }

  #[test]
  fn resume_shifts_the_schedule() {
    let policy = StorePolicy::default();
    // 2025-05-10 08:00 IST
    let now = Utc.with_ymd_and_hms(2025, 5, 10, 2, 30, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let mut sub = UserSubscription::new_pending(&plan(), Uuid::new_v4(), start, address(), DeliveryShift::Morning, now);
    sub.status = SubscriptionStatus::Active;
    sub.record_delivery(DeliveryOutcome::Delivered, now).unwrap();
    sub.record_delivery(DeliveryOutcome::Delivered, now).unwrap();
    sub.pause(now).unwrap();

    sub.resume(now, &policy).unwrap();

    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.next_delivery_date, NaiveDate::from_ymd_opt(2025, 5, 11).unwrap());
    assert_eq!(sub.end_date, NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());
  }

  #[test]
  fn lazy_expiry() {
    let now = Utc.with_ymd_and_hms(2025, 5, 1, 6, 0, 0).unwrap();
    let start = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let mut sub = UserSubscription::new_pending(&plan(), Uuid::new_v4(), start, address(), DeliveryShift::Morning, now);
    sub.status = SubscriptionStatus::Paused;
    assert_eq!(sub.effective_status(sub.end_date), SubscriptionStatus::Paused);
    let after = NaiveDate::from_ymd_opt(2025, 5, 9).unwrap();
    assert_eq!(sub.effective_status(after), SubscriptionStatus::Expired);
    assert!(sub.settle_expiry(after, now));
    assert_eq!(sub.status, SubscriptionStatus::Expired);
  }
}
