//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use eventlog::EventLogConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the `SQLite` database holding the persisted log.
    pub database_path: PathBuf,

    /// Engine settings, the `[engine]` table.
    #[serde(default)]
    pub engine: EventLogConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("max_events", &self.engine.max_events)
            .field("session_timeout_minutes", &self.engine.session_timeout_minutes)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("eventlog.db"),
            engine: EventLogConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/eventlog/config.toml`, the
    /// given file, then `EVENTLOG_*` env vars (`__` separates nested keys,
    /// e.g. `EVENTLOG_ENGINE__MAX_EVENTS=500`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("EVENTLOG_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for eventlog.
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("eventlog"))
}

/// Returns the platform-specific data directory for eventlog.
///
/// On Linux: `~/.local/share/eventlog`
pub fn dirs_data_path() -> Option<PathBuf> {
    eventlog::default_data_dir()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_eventlog() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "eventlog");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("eventlog.db"));
        assert_eq!(config.engine, EventLogConfig::default());
    }

    #[test]
    fn test_config_file_sets_engine_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/custom.db"

[engine]
max_events = 50
batch_write_delay_ms = 10
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.engine.max_events, 50);
        assert_eq!(config.engine.batch_write_delay_ms, 10);
        assert_eq!(config.engine.max_age_days, 7);
    }
}
