use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install a formatting subscriber for the host process.
///
/// `RUST_LOG` takes precedence over `default_level`. Returns false if a
/// global subscriber was already set.
pub fn init(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
        .is_ok()
}

/// Install the subscriber using the configured `log_level`
pub fn init_from_config(config: &Config) -> bool {
    init(&config.log_level)
}
