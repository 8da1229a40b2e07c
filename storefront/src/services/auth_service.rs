// dairy_storefront/src/services/auth_service.rs

//! Bearer-token identity.
//!
//! Tokens are issued by an external identity service; this crate only verifies
//! them. `issue_token` exists for tests and operator tooling.

use crate::errors::AppError;
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Buyer,
  Admin,
  Delivery,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Buyer => "buyer",
      Role::Admin => "admin",
      Role::Delivery => "delivery",
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
  pub sub: Uuid,
  pub role: Role,
  pub exp: usize,
}

#[instrument(name = "auth_service::issue_token", skip(secret), err(Display))]
pub fn issue_token(secret: &str, user_id: Uuid, role: Role, ttl: Duration) -> Result<String, AppError> {
  let exp = (Utc::now() + ttl).timestamp().max(0) as usize;
  let claims = Claims { sub: user_id, role, exp };
  encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
    .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
  decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::new(Algorithm::HS256))
    .map(|data| data.claims)
    .map_err(|e| {
      warn!(error = %e, "Bearer token rejected.");
      AppError::Auth("Invalid or expired token".to_string())
    })
}

/// The caller, taken from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
  pub user_id: Uuid,
  pub role: Role,
}

impl Identity {
  pub fn require(&self, role: Role) -> Result<(), AppError> {
    if self.role == role {
      Ok(())
    } else {
      Err(AppError::Forbidden(format!("This action requires the {} role", role.as_str())))
    }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }
}

fn identity_from_request(req: &HttpRequest) -> Result<Identity, AppError> {
  let state = req
    .app_data::<web::Data<AppState>>()
    .ok_or_else(|| AppError::Internal("Application state is not configured".to_string()))?;
  let header = req
    .headers()
    .get(actix_web::http::header::AUTHORIZATION)
    .and_then(|h| h.to_str().ok())
    .ok_or_else(|| AppError::Auth("Missing Authorization header".to_string()))?;
  let token = header
    .strip_prefix("Bearer ")
    .ok_or_else(|| AppError::Auth("Authorization header must be a bearer token".to_string()))?;
  let claims = verify_token(&state.config.jwt_secret, token.trim())?;
  Ok(Identity { user_id: claims.sub, role: claims.role })
}

impl FromRequest for Identity {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    ready(identity_from_request(req))
  }
}
