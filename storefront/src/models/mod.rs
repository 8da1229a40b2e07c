// dairy_storefront/src/models/mod.rs

//! Persisted records and the state machines that govern them.

pub mod delivery_person;
pub mod order;
pub mod payment;
pub mod product;
pub mod refund;
pub mod subscription;

pub use delivery_person::{DeliveryPerson, DeliveryPersonStatus};
pub use order::{
  CancelledBy, DeliveryShift, LineItem, Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress,
};
pub use payment::{PaymentSession, SessionState, VerificationDecision, VerificationStatus};
pub use product::Product;
pub use refund::{RefundDetails, RefundRequest, RefundStatus, RefundTarget};
pub use subscription::{MilkType, SubscriptionPlan, SubscriptionStatus, UserSubscription};
