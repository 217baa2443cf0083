//! Logging setup for plugin processes.
//!
//! Subscribers always write to **stderr**: stdout carries exactly one line,
//! the handshake, and the host reads it synchronously.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with plugin defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format on stderr
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}
