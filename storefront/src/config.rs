// dairy_storefront/src/config.rs

use crate::errors::{AppError, Result};
use chrono::{Duration, FixedOffset, Offset, Utc};
use dotenvy::dotenv;
use std::env;

/// Business values every domain rule reads. Kept apart from process settings
/// so rules can be exercised without an environment.
#[derive(Debug, Clone)]
pub struct StorePolicy {
  pub utc_offset: FixedOffset,
  pub slot_lookahead_days: u32,
  pub payment_session_ttl: Duration,
  pub upi_id: String,
  pub upi_name: String,
  pub free_delivery_threshold_paise: i64,
  pub delivery_fee_paise: i64,
  pub tax_rate_bps: i64,
  pub cod_enabled: bool,
}

pub const IST_OFFSET_SECONDS: i32 = 330 * 60;

/// Longest payment session lifetime accepted from the environment (one day).
pub const MAX_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

pub fn session_ttl(seconds: i64) -> Result<Duration> {
  if !(1..=MAX_SESSION_TTL_SECONDS).contains(&seconds) {
    return Err(AppError::Config(format!(
      "PAYMENT_SESSION_TTL_SECONDS must be between 1 and {}, got {}",
      MAX_SESSION_TTL_SECONDS, seconds
    )));
  }
  Duration::try_seconds(seconds)
    .ok_or_else(|| AppError::Config(format!("PAYMENT_SESSION_TTL_SECONDS out of range: {}", seconds)))
}

impl Default for StorePolicy {
  fn default() -> Self {
    Self {
      utc_offset: FixedOffset::east_opt(IST_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix()),
      slot_lookahead_days: 7,
      payment_session_ttl: Duration::seconds(900),
      upi_id: "dairy@upi".to_string(),
      upi_name: "Dairy Farm".to_string(),
      free_delivery_threshold_paise: 50_000,
      delivery_fee_paise: 5_000,
      tax_rate_bps: 0,
      cod_enabled: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub jwt_secret: String,
  pub run_migrations: bool,
  pub notify_sender: String,
  pub log_format: LogFormat,
  pub policy: StorePolicy,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let parse_env = |var_name: &str, default: &str| -> Result<String> {
      Ok(get_env(var_name).unwrap_or_else(|_| default.to_string()))
    };

    let server_host = parse_env("SERVER_HOST", "127.0.0.1")?;
    let server_port = parse_env("SERVER_PORT", "8080")?
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let jwt_secret = get_env("JWT_SECRET")?;
    if jwt_secret.len() < 16 {
      return Err(AppError::Config("JWT_SECRET must be at least 16 characters".to_string()));
    }
    let run_migrations = parse_env("RUN_MIGRATIONS", "true")?
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;
    let notify_sender = parse_env("NOTIFY_SENDER", "orders@dairy.example")?;
    let log_format = match parse_env("LOG_FORMAT", "pretty")?.to_ascii_lowercase().as_str() {
      "json" => LogFormat::Json,
      "pretty" | "text" => LogFormat::Pretty,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT: {}", other))),
    };

    let offset_minutes = parse_env("STORE_UTC_OFFSET_MINUTES", "330")?
      .parse::<i32>()
      .map_err(|e| AppError::Config(format!("Invalid STORE_UTC_OFFSET_MINUTES: {}", e)))?;
    let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
      .ok_or_else(|| AppError::Config(format!("STORE_UTC_OFFSET_MINUTES out of range: {}", offset_minutes)))?;

    let slot_lookahead_days = parse_env("SLOT_LOOKAHEAD_DAYS", "7")?
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid SLOT_LOOKAHEAD_DAYS: {}", e)))?;
    if !(1..=31).contains(&slot_lookahead_days) {
      return Err(AppError::Config("SLOT_LOOKAHEAD_DAYS must be between 1 and 31".to_string()));
    }

    let payment_session_ttl = session_ttl(
      parse_env("PAYMENT_SESSION_TTL_SECONDS", "900")?
        .parse::<i64>()
        .map_err(|e| AppError::Config(format!("Invalid PAYMENT_SESSION_TTL_SECONDS: {}", e)))?,
    )?;

    let parse_paise = |var_name: &str, default: &str| -> Result<i64> {
      let value = parse_env(var_name, default)?
        .parse::<i64>()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))?;
      if value < 0 {
        return Err(AppError::Config(format!("{} must not be negative", var_name)));
      }
      Ok(value)
    };

    let policy = StorePolicy {
      utc_offset,
      slot_lookahead_days,
      payment_session_ttl,
      upi_id: parse_env("UPI_ID", "dairy@upi")?,
      upi_name: parse_env("UPI_NAME", "Dairy Farm")?,
      free_delivery_threshold_paise: parse_paise("FREE_DELIVERY_THRESHOLD_PAISE", "50000")?,
      delivery_fee_paise: parse_paise("DELIVERY_FEE_PAISE", "5000")?,
      tax_rate_bps: parse_paise("TAX_RATE_BPS", "0")?,
      cod_enabled: parse_env("COD_ENABLED", "true")?
        .parse::<bool>()
        .map_err(|e| AppError::Config(format!("Invalid COD_ENABLED value: {}", e)))?,
    };

    tracing::info!(
      host = %server_host,
      port = server_port,
      utc_offset = %policy.utc_offset,
      session_ttl_secs = policy.payment_session_ttl.num_seconds(),
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      jwt_secret,
      run_migrations,
      notify_sender,
      log_format,
      policy,
    })
  }

  /// Configuration for in-process use (tests, local tooling) with default policy.
  pub fn local(jwt_secret: impl Into<String>) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 0,
      database_url: String::new(),
      jwt_secret: jwt_secret.into(),
      run_migrations: false,
      notify_sender: "orders@dairy.example".to_string(),
      log_format: LogFormat::Pretty,
      policy: StorePolicy::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn session_ttl_accepts_the_default_window() {
    assert_eq!(session_ttl(900).unwrap(), Duration::minutes(15));
    assert_eq!(session_ttl(MAX_SESSION_TTL_SECONDS).unwrap(), Duration::days(1));
  }

  #[test]
  fn session_ttl_rejects_values_chrono_cannot_hold() {
    for seconds in [0, -5, MAX_SESSION_TTL_SECONDS + 1, i64::MAX, i64::MIN] {
      assert!(matches!(session_ttl(seconds), Err(AppError::Config(_))), "{} accepted", seconds);
    }
  }
}
