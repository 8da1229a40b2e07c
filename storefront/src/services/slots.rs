// dairy_storefront/src/services/slots.rs

//! Delivery slot calculator.
//!
//! Every slot for calendar date `D` closes at 23:59:00 local time on `D - 1`.
//! A slot is orderable while `now <= cutoff`. All dates are calendar dates in
//! the dairy's local timezone; instants are UTC. Results depend only on `now`
//! and the policy, so handlers recompute them on every request.

use crate::config::StorePolicy;
use crate::errors::{AppError, Result};
use crate::models::DeliveryShift;
use chrono::{DateTime, Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;

const CUTOFF_HOUR: u32 = 23;
const CUTOFF_MINUTE: u32 = 59;

pub const EVENING_UNAVAILABLE: &str = "Evening delivery is currently unavailable";

fn cutoff_time() -> NaiveTime {
  NaiveTime::from_hms_opt(CUTOFF_HOUR, CUTOFF_MINUTE, 0).unwrap_or(NaiveTime::MIN)
}

/// Cutoff instant for deliveries on `date`: 23:59:00 local on the previous day.
pub fn cutoff_for(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
  let previous = date.pred_opt().unwrap_or(date);
  let local = previous.and_time(cutoff_time());
  let utc_naive = local - Duration::seconds(i64::from(offset.local_minus_utc()));
  Utc.from_utc_datetime(&utc_naive)
}

pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
  now.with_timezone(&offset).date_naive()
}

/// First date whose morning slot is still open at `now`.
pub fn earliest_orderable_date(now: DateTime<Utc>, policy: &StorePolicy) -> NaiveDate {
  let today = local_today(now, policy.utc_offset);
  let tomorrow = today.succ_opt().unwrap_or(today);
  if now <= cutoff_for(tomorrow, policy.utc_offset) {
    tomorrow
  } else {
    tomorrow.succ_opt().unwrap_or(tomorrow)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
  pub shift: DeliveryShift,
  pub available: bool,
  pub cutoff: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDay {
  pub date: NaiveDate,
  pub label: String,
  pub slots: Vec<SlotAvailability>,
}

impl DeliveryDay {
  pub fn slot(&self, shift: DeliveryShift) -> Option<&SlotAvailability> {
    self.slots.iter().find(|s| s.shift == shift)
  }
}

fn weekday_name(day: Weekday) -> &'static str {
  match day {
    Weekday::Mon => "Monday",
    Weekday::Tue => "Tuesday",
    Weekday::Wed => "Wednesday",
    Weekday::Thu => "Thursday",
    Weekday::Fri => "Friday",
    Weekday::Sat => "Saturday",
    Weekday::Sun => "Sunday",
  }
}

fn day_label(date: NaiveDate, today: NaiveDate) -> String {
  match (date - today).num_days() {
    0 => "Today".to_string(),
    1 => "Tomorrow".to_string(),
    _ => weekday_name(date.weekday()).to_string(),
  }
}

pub fn slot_availability(
  date: NaiveDate,
  shift: DeliveryShift,
  now: DateTime<Utc>,
  policy: &StorePolicy,
) -> SlotAvailability {
  let cutoff = cutoff_for(date, policy.utc_offset);
  let today = local_today(now, policy.utc_offset);
  let reason = match shift {
    DeliveryShift::Evening => Some(EVENING_UNAVAILABLE.to_string()),
    DeliveryShift::Morning if now <= cutoff => None,
    DeliveryShift::Morning if date < today => Some(format!("{} is in the past", date)),
    DeliveryShift::Morning if date == today => Some("Cutoff passed for today".to_string()),
    DeliveryShift::Morning => Some(format!("Order cutoff (23:59 the previous day) has passed for {}", date)),
  };
  SlotAvailability { shift, available: reason.is_none(), cutoff, reason }
}

/// The lookahead window starting at the local "today" of `now`.
pub fn delivery_slots(now: DateTime<Utc>, policy: &StorePolicy) -> Vec<DeliveryDay> {
  let today = local_today(now, policy.utc_offset);
  (0..policy.slot_lookahead_days)
    .filter_map(|offset| today.checked_add_days(Days::new(u64::from(offset))))
    .map(|date| DeliveryDay {
      date,
      label: day_label(date, today),
      slots: DeliveryShift::ALL
        .iter()
        .map(|shift| slot_availability(date, *shift, now, policy))
        .collect(),
    })
    .collect()
}

/// Submit-time re-check of a requested slot.
pub fn ensure_slot_available(
  date: NaiveDate,
  shift: DeliveryShift,
  now: DateTime<Utc>,
  policy: &StorePolicy,
) -> Result<()> {
  let today = local_today(now, policy.utc_offset);
  let last = today
    .checked_add_days(Days::new(u64::from(policy.slot_lookahead_days.saturating_sub(1))))
    .unwrap_or(today);
  if date > last {
    return Err(AppError::Validation(format!(
      "Delivery date {} is beyond the {}-day booking window",
      date, policy.slot_lookahead_days
    )));
  }
  let slot = slot_availability(date, shift, now, policy);
  match slot.reason {
    None => Ok(()),
    Some(reason) => Err(AppError::Validation(reason)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ist(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    let policy = StorePolicy::default();
    policy
      .utc_offset
      .with_ymd_and_hms(y, m, d, h, min, s)
      .unwrap()
      .with_timezone(&Utc)
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn cutoff_is_previous_day_2359_local() {
    let policy = StorePolicy::default();
    assert_eq!(cutoff_for(date(2025, 6, 11), policy.utc_offset), ist(2025, 6, 10, 23, 59, 0));
  }

  #[test]
  fn tomorrow_morning_open_at_2358() {
    let policy = StorePolicy::default();
    let now = ist(2025, 6, 10, 23, 58, 0);
    let slot = slot_availability(date(2025, 6, 11), DeliveryShift::Morning, now, &policy);
    assert!(slot.available);
    assert!(slot.reason.is_none());
  }

  #[test]
  fn boundary_is_inclusive() {
    let policy = StorePolicy::default();
    let tomorrow = date(2025, 6, 11);
    assert!(slot_availability(tomorrow, DeliveryShift::Morning, ist(2025, 6, 10, 23, 59, 0), &policy).available);
    assert!(!slot_availability(tomorrow, DeliveryShift::Morning, ist(2025, 6, 10, 23, 59, 1), &policy).available);
  }

  #[test]
  fn today_morning_closed_after_midnight() {
    let policy = StorePolicy::default();
    let now = ist(2025, 6, 10, 0, 1, 0);
    let slot = slot_availability(date(2025, 6, 10), DeliveryShift::Morning, now, &policy);
    assert!(!slot.available);
    assert_eq!(slot.reason.as_deref(), Some("Cutoff passed for today"));
  }

  #[test]
  fn evening_is_never_offered() {
    let policy = StorePolicy::default();
    let now = ist(2025, 6, 10, 9, 0, 0);
    let slot = slot_availability(date(2025, 6, 12), DeliveryShift::Evening, now, &policy);
    assert!(!slot.available);
    assert_eq!(slot.reason.as_deref(), Some(EVENING_UNAVAILABLE));
  }

  #[test]
  fn window_starts_today_and_spans_lookahead() {
    let policy = StorePolicy::default();
    let now = ist(2025, 6, 10, 9, 0, 0);
    let days = delivery_slots(now, &policy);
    assert_eq!(days.len(), 7);
    assert_eq!(days[0].date, date(2025, 6, 10));
    assert_eq!(days[0].label, "Today");
    assert_eq!(days[1].label, "Tomorrow");
    assert_eq!(days[6].date, date(2025, 6, 16));
    assert!(!days[0].slot(DeliveryShift::Morning).unwrap().available);
    assert!(days[1].slot(DeliveryShift::Morning).unwrap().available);
  }

  #[test]
  fn utc_instant_maps_to_local_day() {
    let policy = StorePolicy::default();
    // 20:00 UTC on the 10th is 01:30 IST on the 11th.
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 20, 0, 0).unwrap();
    assert_eq!(local_today(now, policy.utc_offset), date(2025, 6, 11));
    assert_eq!(earliest_orderable_date(now, &policy), date(2025, 6, 12));
  }

  #[test]
  fn submit_recheck_rejects_outside_window() {
    let policy = StorePolicy::default();
    let now = ist(2025, 6, 10, 9, 0, 0);
    assert!(ensure_slot_available(date(2025, 6, 11), DeliveryShift::Morning, now, &policy).is_ok());
    assert!(matches!(
      ensure_slot_available(date(2025, 6, 17), DeliveryShift::Morning, now, &policy),
      Err(AppError::Validation(_))
    ));
    assert!(matches!(
      ensure_slot_available(date(2025, 6, 9), DeliveryShift::Morning, now, &policy),
      Err(AppError::Validation(_))
    ));
  }
}
