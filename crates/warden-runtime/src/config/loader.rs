//! Configuration loader with layered merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`<config dir>/warden/config.toml`)
//! 3. Explicit file ([`ConfigLoader::with_file`])
//! 4. Environment variables (`WARDEN_*`)
//!
//! Each layer overrides the previous.

use super::{default_config_path, ConfigError, EngineConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use warden_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_file("/etc/warden/engine.toml")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), warden_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to [`default_config_path`]).
    global_config_path: Option<PathBuf>,

    /// Explicit config file layered over the global one.
    file: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip global config loading.
    skip_global: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Layers an explicit config file over the global one.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read or
    /// parsed, or an environment variable holds an invalid value. Missing
    /// files are silently ignored.
    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::default();

        // Layer 1: Global config
        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .or_else(default_config_path);

            if let Some(global_path) = global_path {
                if let Some(global_config) = self.load_file(&global_path)? {
                    debug!(path = %global_path.display(), "Loaded global config");
                    config.merge(&global_config);
                }
            }
        }

        // Layer 2: Explicit file
        if let Some(ref path) = self.file {
            if let Some(file_config) = self.load_file(path)? {
                debug!(path = %path.display(), "Loaded config file");
                config.merge(&file_config);
            }
        }

        // Layer 3: Environment variables
        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }

        config.contexts.parsed_static()?;
        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<EngineConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            EngineConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        parse_env_bool!(config.debug, "WARDEN_DEBUG");
        parse_env_bool!(config.cache.weak_listeners, "WARDEN_WEAK_LISTENERS");
        parse_env_bool!(config.defaults.enabled, "WARDEN_DEFAULTS_ENABLED");

        if let Ok(val) = std::env::var("WARDEN_TICK_MS") {
            config.contexts.tick_ms = val
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env_var("WARDEN_TICK_MS", "expected integer"))?;
        }

        if let Ok(val) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = val;
        }

        if let Ok(val) = std::env::var("WARDEN_STATIC_CONTEXTS") {
            config.contexts.static_contexts = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
