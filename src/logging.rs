//! Tracing subscriber initialization.
//!
//! Call one of these once at startup, before `listen()`. The `RUST_LOG`
//! environment variable always wins over the programmatic level, so
//! deployments can raise verbosity without a rebuild.

use crate::config::LogLevel;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the subscriber at the default `info` level.
///
/// # Panics
///
/// Panics if a global subscriber is already set; call it once.
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Installs the subscriber at the level configured in [`Config::log_level`].
///
/// [`Config::log_level`]: crate::Config::log_level
///
/// # Panics
///
/// Panics if a global subscriber is already set; call it once.
pub fn init_with_level(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.as_filter().into()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
