//! Engine configuration.
//!
//! | Key | Env var | Default |
//! |-----|---------|---------|
//! | `debug` | `WARDEN_DEBUG` | `false` |
//! | `cache.weak_listeners` | `WARDEN_WEAK_LISTENERS` | `true` |
//! | `contexts.tick_ms` | `WARDEN_TICK_MS` | `50` |
//! | `contexts.static` | `WARDEN_STATIC_CONTEXTS` (comma separated) | `[]` |
//! | `defaults.enabled` | `WARDEN_DEFAULTS_ENABLED` | `true` |
//! | `defaults.subject_type` | | `"defaults"` |
//! | `defaults.fallback_identifier` | | `"default"` |
//! | `logging.level` | `WARDEN_LOG_LEVEL` | `"info"` |
//!
//! See [`ConfigLoader`] for the layering order.

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{CacheConfig, ContextsConfig, DefaultsConfig, EngineConfig, LoggingConfig};

use std::path::PathBuf;

/// Global config directory name under the platform config dir.
pub const CONFIG_DIR: &str = "warden";

/// Config file name.
pub const CONFIG_FILE: &str = "config.toml";

/// `<platform config dir>/warden/config.toml`, if the platform has one.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
