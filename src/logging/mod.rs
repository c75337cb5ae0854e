//! Logging infrastructure for vidtube
//!
//! Subscriber setup for process logs, plus the session audit trail.

pub mod audit;

pub use audit::{AuthEvent, AuthEventKind, AuthEventLog};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `format` is `text` or `json`.
pub fn init(log_level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vidtube={},info", log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
