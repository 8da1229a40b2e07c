// dairy_storefront/src/services/mod.rs

pub mod auth_service;
pub mod notify;
pub mod pricing;
pub mod slots;
