//! Tracing bootstrap.
//!
//! Filter precedence: `RUST_LOG` > `debug` flag > [`LoggingConfig::level`].

use crate::config::{EngineConfig, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directive for `config`, ignoring `RUST_LOG`.
#[must_use]
pub fn filter_directive(config: &EngineConfig) -> String {
    if config.debug {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    }
}

/// Installs a global `fmt` subscriber.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is kept.
pub fn init(config: &EngineConfig) -> bool {
    init_with(&config.logging, &filter_directive(config))
}

/// Installs a global `fmt` subscriber using `directive` as the fallback
/// filter.
pub fn init_with(logging: &LoggingConfig, directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let layer = fmt::layer()
        .with_target(logging.target)
        .with_ansi(logging.ansi);

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_level() {
        let mut config = EngineConfig::default();
        assert_eq!(filter_directive(&config), "info");
        config.logging.level = "warn,warden_runtime=trace".into();
        assert_eq!(filter_directive(&config), "warn,warden_runtime=trace");
        config.debug = true;
        assert_eq!(filter_directive(&config), "debug");
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = EngineConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
