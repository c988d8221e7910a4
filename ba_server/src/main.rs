//! Authentication server for the blood test analyzer.
//!
//! Serves the magic-link, password and session endpoints over HTTP, backed by
//! the PostgreSQL credential store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use ba_server::{api, config::ServerConfig, logging, metrics, sweeper};
use blood_analyzer::{auth::AuthManager, db::Database, email::LogTransport};
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run the blood test analyzer authentication server

USAGE:
  ba_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               Access token signing secret
  JWT_REFRESH_SECRET       Refresh token signing secret
  PASSWORD_PEPPER          Password hashing pepper
  BACKEND_URL              Public base URL for magic links
  EMAIL_FROM               Sender address for magic links
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exporter listening on {}", addr);
    }

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.ensure_schema()
        .await
        .context("Failed to apply database schema")?;
    info!("Database connected successfully");

    let auth_manager = Arc::new(AuthManager::new(
        Arc::new(db.credential_store()),
        Arc::new(LogTransport),
        &config.auth,
    ));

    let sweep_task = sweeper::spawn_magic_link_sweeper(
        auth_manager.clone(),
        config.magic_link_sweep_interval,
    );

    let app = api::create_router(api::AppState { auth_manager });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    sweep_task.abort();
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}
