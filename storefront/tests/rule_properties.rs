// dairy_storefront/tests/rule_properties.rs

mod common;

use chrono::{Duration, NaiveDate};
use common::{ist, start_time};
use dairy_storefront::config::StorePolicy;
use dairy_storefront::models::subscription::DeliveryOutcome;
use dairy_storefront::models::{LineItem, SubscriptionStatus};
use dairy_storefront::services::{pricing, slots};
use proptest::prelude::*;
use uuid::Uuid;

fn line(unit_price_paise: i64, quantity: i32) -> LineItem {
  LineItem {
    product_id: Uuid::new_v4(),
    name: "Milk".to_string(),
    unit: "1 L".to_string(),
    unit_price_paise,
    quantity,
  }
}

proptest! {
  #[test]
  fn totals_add_up(lines in prop::collection::vec((1i64..50_000, 1i32..=100), 1..8)) {
    let policy = StorePolicy::default();
    let items: Vec<LineItem> = lines.iter().map(|(p, q)| line(*p, *q)).collect();
    let totals = pricing::compute_totals(&items, &policy).unwrap();
    let subtotal: i64 = lines.iter().map(|(p, q)| p * i64::from(*q)).sum();
    prop_assert_eq!(totals.subtotal_paise, subtotal);
    let expected_fee = if subtotal >= policy.free_delivery_threshold_paise { 0 } else { policy.delivery_fee_paise };
    prop_assert_eq!(totals.shipping_fee_paise, expected_fee);
    prop_assert_eq!(
      totals.total_amount_paise,
      totals.subtotal_paise + totals.shipping_fee_paise + totals.tax_paise - totals.discount_paise
    );
  }

  #[test]
  fn slot_open_exactly_until_cutoff(day_offset in 0u32..7, seconds in -172_800i64..172_800) {
    let policy = StorePolicy::default();
    let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap() + Duration::days(i64::from(day_offset));
    let cutoff = slots::cutoff_for(date, policy.utc_offset);
    let now = cutoff + Duration::seconds(seconds);
    let slot = slots::slot_availability(date, dairy_storefront::models::DeliveryShift::Morning, now, &policy);
    prop_assert_eq!(slot.available, seconds <= 0);
  }

  #[test]
  fn evening_never_available(seconds in 0i64..1_000_000) {
    let policy = StorePolicy::default();
    let now = start_time() + Duration::seconds(seconds);
    for day in slots::delivery_slots(now, &policy) {
      let evening = day.slot(dairy_storefront::models::DeliveryShift::Evening).unwrap();
      prop_assert!(!evening.available);
    }
  }

  #[test]
  fn deliveries_never_exceed_plan(outcomes in prop::collection::vec(any::<bool>(), 0..40)) {
    let mut sub = common_subscription();
    sub.status = SubscriptionStatus::Active;
    let now = ist(2025, 6, 11, 7, 0, 0);
    for delivered in outcomes {
      let outcome = if delivered { DeliveryOutcome::Delivered } else { DeliveryOutcome::Skipped };
      let _ = sub.record_delivery(outcome, now);
      prop_assert!(sub.completed_deliveries + sub.skipped_deliveries <= sub.total_deliveries);
    }
    prop_assert_eq!(sub.remaining_deliveries() == 0, sub.status == SubscriptionStatus::Completed);
  }
}

fn common_subscription() -> dairy_storefront::models::UserSubscription {
  use dairy_storefront::models::{DeliveryShift, MilkType, ShippingAddress, SubscriptionPlan, UserSubscription};
  use sqlx::types::Json;
  let now = start_time();
  let plan = SubscriptionPlan {
    id: Uuid::new_v4(),
    name: "Cow Milk 1L".to_string(),
    milk_type: MilkType::Cow,
    volume: "1 L".to_string(),
    duration_days: 15,
    price_paise: 85_000,
    original_price_paise: 90_000,
    daily_price_paise: 0,
    discount_percent: 0,
    features: Json(Vec::new()),
    is_active: true,
    created_at: now,
    updated_at: now,
  };
  let address = ShippingAddress {
    name: "Asha".to_string(),
    address: "12 MG Road".to_string(),
    city: "Pune".to_string(),
    state: "MH".to_string(),
    zip_code: "411001".to_string(),
    phone: "9876543210".to_string(),
  };
  UserSubscription::new_pending(&plan, Uuid::new_v4(), common::tomorrow(), address, DeliveryShift::Morning, now)
}
