//! Engine configuration, file/env loading and runtime overrides.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::EventLogError;

const MS_PER_MINUTE: i64 = 60 * 1000;
const MS_PER_DAY: i64 = 24 * 60 * MS_PER_MINUTE;

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Ring buffer capacity. Must be positive.
    pub max_events: usize,
    /// Persisted events older than this are dropped at init.
    pub max_age_days: u32,
    /// A persisted session idle for at least this long is not resumed.
    pub session_timeout_minutes: u32,
    /// Quiet period before buffered events are written to storage.
    pub batch_write_delay_ms: u64,
    pub features: FeatureConfig,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            max_age_days: 7,
            session_timeout_minutes: 30,
            batch_write_delay_ms: 100,
            features: FeatureConfig::default(),
        }
    }
}

/// Optional capture modules. Each is enabled unless turned off explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub network: NetworkConfig,
    pub global_errors: GlobalErrorsConfig,
}

/// Network capture options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub log_request_body: bool,
    pub log_response_body: bool,
    /// Bodies longer than this many bytes are replaced with a size note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<usize>,
    /// Header names (case-insensitive) whose values are redacted.
    pub redact_headers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_request_body: false,
            log_response_body: false,
            max_body_size: None,
            redact_headers: Vec::new(),
        }
    }
}

/// Global error (panic) capture options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalErrorsConfig {
    pub enabled: bool,
}

impl Default for GlobalErrorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EventLogConfig {
    /// Loads configuration from defaults, an optional TOML file, and `EVENTLOG_*` env vars.
    ///
    /// Nested keys use `__` in env var names, e.g.
    /// `EVENTLOG_FEATURES__NETWORK__ENABLED=false`.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("EVENTLOG_").split("__"))
            .extract()
    }

    /// Returns this configuration with every field set in `overrides` replaced.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at init"
    )]
    pub fn merged(&self, overrides: &ConfigOverrides) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(self))
            .merge(Serialized::defaults(overrides))
            .extract()
    }

    /// Ring buffer capacity, rejecting zero.
    pub fn capacity(&self) -> Result<NonZeroUsize, EventLogError> {
        NonZeroUsize::new(self.max_events).ok_or_else(|| EventLogError::InvalidConfig {
            reason: "max_events must be greater than zero".to_string(),
        })
    }

    pub fn session_timeout_ms(&self) -> i64 {
        i64::from(self.session_timeout_minutes) * MS_PER_MINUTE
    }

    pub fn max_age_ms(&self) -> i64 {
        i64::from(self.max_age_days) * MS_PER_DAY
    }

    pub const fn batch_write_delay(&self) -> Duration {
        Duration::from_millis(self.batch_write_delay_ms)
    }
}

/// Partial configuration applied on top of the base config at `init`.
///
/// Only fields that are `Some` take effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_write_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "FeatureOverrides::is_empty")]
    pub features: FeatureOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOverrides {
    #[serde(default, skip_serializing_if = "NetworkOverrides::is_empty")]
    pub network: NetworkOverrides,
    #[serde(default, skip_serializing_if = "GlobalErrorsOverrides::is_empty")]
    pub global_errors: GlobalErrorsOverrides,
}

impl FeatureOverrides {
    fn is_empty(&self) -> bool {
        self.network.is_empty() && self.global_errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_request_body: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_response_body: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_headers: Option<Vec<String>>,
}

impl NetworkOverrides {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalErrorsOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl GlobalErrorsOverrides {
    const fn is_empty(&self) -> bool {
        self.enabled.is_none()
    }
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    #[must_use]
    pub const fn max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    #[must_use]
    pub const fn session_timeout_minutes(mut self, minutes: u32) -> Self {
        self.session_timeout_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub const fn batch_write_delay_ms(mut self, millis: u64) -> Self {
        self.batch_write_delay_ms = Some(millis);
        self
    }

    #[must_use]
    pub const fn network_enabled(mut self, enabled: bool) -> Self {
        self.features.network.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub const fn global_errors_enabled(mut self, enabled: bool) -> Self {
        self.features.global_errors.enabled = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EventLogConfig::default();
        assert_eq!(config.max_events, 1000);
        assert_eq!(config.max_age_days, 7);
        assert_eq!(config.session_timeout_ms(), 30 * 60 * 1000);
        assert_eq!(config.batch_write_delay(), Duration::from_millis(100));
        assert!(config.features.network.enabled);
        assert!(config.features.global_errors.enabled);
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let base = EventLogConfig {
            max_age_days: 3,
            ..EventLogConfig::default()
        };
        let merged = base
            .merged(&ConfigOverrides::new().max_events(50).network_enabled(false))
            .unwrap();

        assert_eq!(merged.max_events, 50);
        assert_eq!(merged.max_age_days, 3);
        assert!(!merged.features.network.enabled);
        assert!(merged.features.global_errors.enabled);
    }

    #[test]
    fn empty_overrides_are_identity() {
        let base = EventLogConfig::default();
        assert_eq!(base.merged(&ConfigOverrides::new()).unwrap(), base);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EventLogConfig {
            max_events: 0,
            ..EventLogConfig::default()
        };
        assert!(matches!(
            config.capacity(),
            Err(EventLogError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn loads_nested_tables_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
max_events = 25

[features.network]
enabled = false
redact_headers = ["Cookie"]
"#
        )
        .unwrap();

        let config = EventLogConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.max_events, 25);
        assert!(!config.features.network.enabled);
        assert_eq!(config.features.network.redact_headers, vec!["Cookie"]);
        assert_eq!(config.session_timeout_minutes, 30);
    }
}
