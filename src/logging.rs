//! Tracing subscriber setup.

use crate::config::AppConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialises the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the configured log level is used
/// as the filter directive. Safe to call once per process; subsequent calls
/// are ignored.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
