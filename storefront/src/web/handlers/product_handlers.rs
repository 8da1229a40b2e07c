// dairy_storefront/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Product;
use crate::pipelines::common_steps::not_found;
use crate::services::auth_service::{Identity, Role};
use crate::state::AppState;

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let products = app_state.store.list_products(false).await?;
  info!(count = products.len(), "Products fetched.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "products": products,
  })))
}

#[instrument(name = "handler::get_product", skip(app_state, path), fields(product_id = %path.as_ref()))]
pub async fn get_product_handler(app_state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  match app_state.store.get_product(product_id).await? {
    Some(product) if product.is_active => Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "product": product,
    }))),
    _ => {
      warn!("Product not found or inactive.");
      Err(not_found("Product", product_id))
    }
  }
}

// --- Admin catalog management ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewProductRequest {
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  pub category: String,
  pub unit: String,
  pub price_paise: i64,
  pub stock_quantity: i32,
  #[serde(default = "default_true")]
  pub is_active: bool,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProductPatchRequest {
  pub name: Option<String>,
  pub description: Option<String>,
  pub category: Option<String>,
  pub unit: Option<String>,
  pub price_paise: Option<i64>,
  pub stock_quantity: Option<i32>,
  pub is_active: Option<bool>,
}

fn validate_product(product: &Product) -> Result<(), AppError> {
  if product.name.trim().is_empty() || product.category.trim().is_empty() || product.unit.trim().is_empty() {
    return Err(AppError::Validation("Product name, category and unit are required".to_string()));
  }
  if product.price_paise <= 0 {
    return Err(AppError::Validation("Product price must be positive".to_string()));
  }
  if product.stock_quantity < 0 {
    return Err(AppError::Validation("Stock cannot be negative".to_string()));
  }
  Ok(())
}

#[instrument(name = "handler::admin_create_product", skip(app_state, identity, body), fields(admin_id = %identity.user_id))]
pub async fn admin_create_product_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  body: web::Json<NewProductRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let req = body.into_inner();
  let now = app_state.now();
  let product = Product {
    id: Uuid::new_v4(),
    name: req.name.trim().to_string(),
    description: req.description,
    category: req.category.trim().to_string(),
    unit: req.unit.trim().to_string(),
    price_paise: req.price_paise,
    stock_quantity: req.stock_quantity,
    is_active: req.is_active,
    created_at: now,
    updated_at: now,
  };
  validate_product(&product)?;
  app_state.store.insert_product(&product).await?;
  info!(product_id = %product.id, "Product created.");
  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "message": "Product created.",
    "product": product,
  })))
}

#[instrument(name = "handler::admin_list_products", skip(app_state, identity))]
pub async fn admin_list_products_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let products = app_state.store.list_products(true).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "products": products })))
}

#[instrument(name = "handler::admin_update_product", skip(app_state, identity, path, body), fields(product_id = %path.as_ref()))]
pub async fn admin_update_product_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  body: web::Json<ProductPatchRequest>,
) -> Result<HttpResponse, AppError> {
  identity.require(Role::Admin)?;
  let product_id = path.into_inner();
  let patch = body.into_inner();
  let mut product = app_state
    .store
    .get_product(product_id)
    .await?
    .ok_or_else(|| not_found("Product", product_id))?;

  if let Some(name) = patch.name {
    product.name = name.trim().to_string();
  }
  if patch.description.is_some() {
    product.description = patch.description;
  }
  if let Some(category) = patch.category {
    product.category = category.trim().to_string();
  }
  if let Some(unit) = patch.unit {
    product.unit = unit.trim().to_string();
  }
  if let Some(price) = patch.price_paise {
    product.price_paise = price;
  }
  if let Some(stock) = patch.stock_quantity {
    product.stock_quantity = stock;
  }
  if let Some(active) = patch.is_active {
    product.is_active = active;
  }
  product.updated_at = app_state.now();
  validate_product(&product)?;

  if !app_state.store.update_product(&product).await? {
    return Err(not_found("Product", product_id));
  }
  info!("Product updated.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": "Product updated.",
    "product": product,
  })))
}
