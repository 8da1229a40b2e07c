// dairy_storefront/src/models/delivery_person.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "delivery_person_status_enum", rename_all = "snake_case")]
pub enum DeliveryPersonStatus {
  Pending,
  Approved,
  Suspended,
  Rejected,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPerson {
  /// Same id as the delivery person's bearer-token subject.
  pub id: Uuid,
  pub name: String,
  pub phone: String,
  pub status: DeliveryPersonStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl DeliveryPerson {
  pub fn can_take_orders(&self) -> bool {
    self.status == DeliveryPersonStatus::Approved
  }
}
