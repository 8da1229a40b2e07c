// dairy_storefront/src/services/pricing.rs

use crate::config::StorePolicy;
use crate::errors::{AppError, Result};
use crate::models::LineItem;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
  pub subtotal_paise: i64,
  pub shipping_fee_paise: i64,
  pub tax_paise: i64,
  pub discount_paise: i64,
  pub total_amount_paise: i64,
}

fn overflow() -> AppError {
  AppError::Validation("Order amount is too large".to_string())
}

/// Subtotal, delivery fee, tax and total for a set of line items.
///
/// Delivery is free at or above the policy threshold. Tax is basis points of
/// the subtotal, rounded half up. There is no coupon engine, so the discount is zero.
pub fn compute_totals(items: &[LineItem], policy: &StorePolicy) -> Result<OrderTotals> {
  let subtotal_paise = items.iter().try_fold(0i64, |acc, item| {
    item.line_total_paise().and_then(|line| acc.checked_add(line)).ok_or_else(overflow)
  })?;
  let shipping_fee_paise = if subtotal_paise >= policy.free_delivery_threshold_paise {
    0
  } else {
    policy.delivery_fee_paise
  };
  let tax_paise = subtotal_paise
    .checked_mul(policy.tax_rate_bps)
    .and_then(|v| v.checked_add(5_000))
    .map(|v| v / 10_000)
    .ok_or_else(overflow)?;
  let discount_paise = 0;
  let total_amount_paise = subtotal_paise
    .checked_add(shipping_fee_paise)
    .and_then(|v| v.checked_add(tax_paise))
    .and_then(|v| v.checked_sub(discount_paise))
    .ok_or_else(overflow)?;
  Ok(OrderTotals { subtotal_paise, shipping_fee_paise, tax_paise, discount_paise, total_amount_paise })
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn item(unit_price_paise: i64, quantity: i32) -> LineItem {
    LineItem {
      product_id: Uuid::new_v4(),
      name: "Milk".into(),
      unit: "1 L".into(),
      unit_price_paise,
      quantity,
    }
  }

  #[test]
  fn free_delivery_at_threshold() {
    let totals = compute_totals(&[item(25_000, 2)], &StorePolicy::default()).unwrap();
    assert_eq!(totals.subtotal_paise, 50_000);
    assert_eq!(totals.shipping_fee_paise, 0);
    assert_eq!(totals.total_amount_paise, 50_000);
  }

  #[test]
  fn fee_below_threshold() {
    let totals = compute_totals(&[item(10_000, 4)], &StorePolicy::default()).unwrap();
    assert_eq!(totals.subtotal_paise, 40_000);
    assert_eq!(totals.shipping_fee_paise, 5_000);
    assert_eq!(totals.total_amount_paise, 45_000);
  }

  #[test]
  fn tax_rounds_half_up() {
    let policy = StorePolicy { tax_rate_bps: 500, ..StorePolicy::default() };
    let totals = compute_totals(&[item(10_010, 1)], &policy).unwrap();
    // 5% of 100.10 = 5.005 -> 5.01
    assert_eq!(totals.tax_paise, 501);
    assert_eq!(totals.total_amount_paise, 10_010 + 5_000 + 501);
  }

  #[test]
  fn overflow_is_a_validation_error() {
    assert!(matches!(
      compute_totals(&[item(i64::MAX, 2)], &StorePolicy::default()),
      Err(AppError::Validation(_))
    ));
  }
}
