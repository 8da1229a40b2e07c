// dairy_storefront/src/main.rs

use dairy_storefront::config::{AppConfig, LogFormat};
use dairy_storefront::services::notify::LogNotifier;
use dairy_storefront::state::{AppState, SystemClock};
use dairy_storefront::store::PgStore;
use dairy_storefront::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const DB_MAX_CONNECTIONS: u32 = 10;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
  std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  // Logging is not up yet, so configuration errors go straight to stderr.
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      eprintln!("Configuration error: {}", e);
      return Err(io_error("configuration", e));
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!("Starting dairy storefront server...");

  let store = PgStore::connect(&app_config.database_url, DB_MAX_CONNECTIONS)
    .await
    .map_err(|e| {
      tracing::error!(error = %e, "Failed to connect to the database.");
      io_error("database connection", e)
    })?;
  tracing::info!("Successfully connected to the database.");

  if app_config.run_migrations {
    store.run_migrations().await.map_err(|e| {
      tracing::error!(error = %e, "Database migrations failed.");
      io_error("migrations", e)
    })?;
    tracing::info!("Database migrations applied.");
  }

  let notifier = LogNotifier { sender: app_config.notify_sender.clone() };
  let app_state = AppState::new(Arc::new(store), app_config.clone(), Arc::new(SystemClock), Arc::new(notifier));
  tracing::info!("Workflow pipelines registered.");

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
