//! Structured logging configuration.
//!
//! The subscriber also captures `log` records, so messages from the
//! `blood_analyzer` library show up alongside the server's own `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Log levels are read from the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use ba_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `user_id` - Optional user ID
/// * `request_id` - Optional request correlation ID
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use ba_server::logging::log_security_event;
///
/// log_security_event(
///     "failed_login",
///     None,
///     Some("7d9f3c2e-request"),
///     "Invalid password attempt"
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    user_id: Option<Uuid>,
    request_id: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id.as_ref().map(tracing::field::display),
        request_id = request_id,
        "SECURITY: {}",
        message
    );
}
