//! Configuration types.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use warden_types::ContextValue;

/// Root engine configuration.
///
/// Every field has a default; a TOML file only needs the keys it changes.
///
/// ```toml
/// debug = false
///
/// [cache]
/// weak_listeners = true
///
/// [contexts]
/// tick_ms = 50
/// static = ["server-tag=lobby"]
///
/// [defaults]
/// enabled = true
/// subject_type = "defaults"
/// fallback_identifier = "default"
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Debug mode (forces `debug` logging).
    pub debug: bool,

    /// Cache settings.
    pub cache: CacheConfig,

    /// Active-context settings.
    pub contexts: ContextsConfig,

    /// Default subject fallback.
    pub defaults: DefaultsConfig,

    /// Logging bootstrap.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the document does not match.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] on failure.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Layers `other` over `self`; only fields where `other` differs from
    /// the default override.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.cache.merge(&other.cache);
        self.contexts.merge(&other.contexts);
        self.defaults.merge(&other.defaults);
        self.logging.merge(&other.logging);
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Register calculated subjects as weak cache listeners.
    pub weak_listeners: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            weak_listeners: true,
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, other: &Self) {
        if other.weak_listeners != Self::default().weak_listeners {
            self.weak_listeners = other.weak_listeners;
        }
    }
}

/// Active-context settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextsConfig {
    /// Background ticker period in milliseconds.
    pub tick_ms: u64,

    /// `key=value` contexts applied to every subject.
    #[serde(rename = "static")]
    pub static_contexts: Vec<String>,
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            static_contexts: Vec::new(),
        }
    }
}

impl ContextsConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        if other.tick_ms != default.tick_ms {
            self.tick_ms = other.tick_ms;
        }
        if !other.static_contexts.is_empty() {
            self.static_contexts = other.static_contexts.clone();
        }
    }

    /// Parses [`static_contexts`](Self::static_contexts).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidContext`] for the first malformed
    /// entry.
    pub fn parsed_static(&self) -> Result<Vec<ContextValue>, ConfigError> {
        self.static_contexts
            .iter()
            .map(|raw| {
                raw.parse::<ContextValue>()
                    .map_err(|_| ConfigError::invalid_context(raw.as_str()))
            })
            .collect()
    }
}

/// Default subject fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Consult default subjects when a query is otherwise undefined.
    pub enabled: bool,

    /// Subject type holding the default subjects.
    pub subject_type: String,

    /// Identifier of the default subject consulted for every type.
    pub fallback_identifier: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subject_type: "defaults".into(),
            fallback_identifier: "default".into(),
        }
    }
}

impl DefaultsConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.subject_type != default.subject_type {
            self.subject_type = other.subject_type.clone();
        }
        if other.fallback_identifier != default.fallback_identifier {
            self.fallback_identifier = other.fallback_identifier.clone();
        }
    }
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Include event targets in output.
    pub target: bool,

    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            target: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        if other.level != default.level {
            self.level = other.level.clone();
        }
        if other.target != default.target {
            self.target = other.target;
        }
        if other.ansi != default.ansi {
            self.ansi = other.ansi;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(!config.debug);
        assert!(config.cache.weak_listeners);
        assert_eq!(config.contexts.tick_ms, 50);
        assert!(config.defaults.enabled);
        assert_eq!(config.defaults.subject_type, "defaults");
        assert_eq!(config.defaults.fallback_identifier, "default");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
[contexts]
static = ["server-tag=lobby"]
"#,
        )
        .expect("valid toml");
        assert_eq!(config.contexts.tick_ms, 50);
        assert_eq!(config.contexts.static_contexts, vec!["server-tag=lobby"]);
        assert_eq!(
            config.contexts.parsed_static().expect("valid contexts"),
            vec![ContextValue::new("server-tag", "lobby")]
        );
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.debug = true;
        config.defaults.subject_type = "fallbacks".into();
        let toml = config.to_toml().expect("serialize");
        assert_eq!(EngineConfig::from_toml(&toml).expect("parse"), config);
    }

    #[test]
    fn merge_only_overrides_non_defaults() {
        let mut base = EngineConfig::default();
        base.contexts.tick_ms = 200;
        base.logging.level = "warn".into();

        let mut overlay = EngineConfig::default();
        overlay.cache.weak_listeners = false;
        overlay.logging.level = "trace".into();

        base.merge(&overlay);
        assert!(!base.cache.weak_listeners);
        assert_eq!(base.contexts.tick_ms, 200);
        assert_eq!(base.logging.level, "trace");
    }

    #[test]
    fn malformed_static_context() {
        let contexts = ContextsConfig {
            static_contexts: vec!["lobby".into()],
            ..ContextsConfig::default()
        };
        let err = contexts.parsed_static().expect_err("missing '='");
        assert!(matches!(err, ConfigError::InvalidContext { .. }));
    }
}
