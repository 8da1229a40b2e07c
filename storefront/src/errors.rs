// dairy_storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use milkflow::FlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Not Authorized: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Illegal Transition: {0}")]
  IllegalTransition(String),

  #[error("Out Of Stock: {0}")]
  OutOfStock(String),

  #[error("Duplicate Payment Session: {0}")]
  DuplicateSession(String),

  /// Payment reference number collided with an existing session.
  #[error("Duplicate Payment Reference: {0}")]
  DuplicateReference(String),

  #[error("Already Processed: {0}")]
  AlreadyProcessed(String),

  #[error("Payment Session Expired: {0}")]
  SessionExpired(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Text safe to show to the caller. Infrastructure details stay in the logs.
  pub fn public_message(&self) -> String {
    match self {
      AppError::Validation(m)
      | AppError::Auth(m)
      | AppError::Forbidden(m)
      | AppError::NotFound(m)
      | AppError::IllegalTransition(m)
      | AppError::OutOfStock(m)
      | AppError::DuplicateSession(m)
      | AppError::DuplicateReference(m)
      | AppError::AlreadyProcessed(m)
      | AppError::SessionExpired(m) => m.clone(),
      AppError::Config(_) => "Service is misconfigured".to_string(),
      AppError::Sqlx(_) => "Database operation failed".to_string(),
      AppError::Workflow { .. } => "Workflow processing error".to_string(),
      AppError::Internal(_) => "An internal error occurred".to_string(),
    }
  }

  /// Short machine-readable kind, included in error bodies.
  pub fn kind(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation",
      AppError::Auth(_) => "authentication",
      AppError::Forbidden(_) => "authorization",
      AppError::NotFound(_) => "not_found",
      AppError::IllegalTransition(_) => "illegal_transition",
      AppError::OutOfStock(_) => "out_of_stock",
      AppError::DuplicateSession(_) => "duplicate_session",
      AppError::DuplicateReference(_) => "duplicate_reference",
      AppError::AlreadyProcessed(_) => "already_processed",
      AppError::SessionExpired(_) => "session_expired",
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => "internal",
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(db_err) => AppError::Sqlx(db_err),
        Err(other) => AppError::Internal(other.to_string()),
      },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::IllegalTransition(_)
      | AppError::OutOfStock(_)
      | AppError::DuplicateSession(_)
      | AppError::DuplicateReference(_)
      | AppError::AlreadyProcessed(_) => StatusCode::CONFLICT,
      AppError::SessionExpired(_) => StatusCode::GONE,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::info!(application_error = %self, "Request rejected");
    }
    HttpResponse::build(status).json(json!({
      "success": false,
      "error": self.kind(),
      "message": self.public_message(),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
