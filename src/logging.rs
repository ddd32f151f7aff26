//! Process-wide `tracing` subscriber installation.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs a fmt subscriber writing to stderr.
///
/// The filter comes from `filter`, then `RUST_LOG`, then [`DEFAULT_LOG_FILTER`].
/// Only the first call has any effect; it returns whether this process ended
/// up with our subscriber installed (false when another global default was
/// already set).
pub fn init_logging(filter: Option<&str>) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = match filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|error| {
                eprintln!("invalid log filter '{directives}': {error}");
                EnvFilter::new(DEFAULT_LOG_FILTER)
            }),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .is_ok()
    })
}
