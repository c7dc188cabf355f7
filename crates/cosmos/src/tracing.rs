//! Logging utilities with cosmos segment prefixes.
//!
//! Provides consistent logging setup across cosmos Rust components.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with a default filter.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (`RUST_LOG` wins over `default_filter` when set)
/// - Compact format suitable for terminal output
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}

/// Segment prefixes for logging.
pub mod prefix {
    /// Async background work prefix (model loads, generation)
    pub const PULSE: &str = "꩜";
    /// Graceful startup prefix
    pub const PULSE_OPEN: &str = "✿";
    /// Graceful shutdown prefix
    pub const PULSE_CLOSE: &str = "❀";
}
