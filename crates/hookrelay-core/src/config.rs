//! Configuration management for hookrelay.

use crate::{CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default scheduler tick interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default maximum number of due tasks claimed per dispatcher batch.
pub const DEFAULT_BATCH_LIMIT: u32 = 100;

/// Default per-attempt HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default ceiling on delivery attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff table in milliseconds: 1s, 5s, 15s, 1min, 5min.
///
/// A tuned policy table, not a closed-form exponential. Delays past the
/// last entry clamp to it.
pub const DEFAULT_BACKOFF_TABLE_MS: [u64; 5] = [1_000, 5_000, 15_000, 60_000, 300_000];

/// Main hookrelay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Scheduler tick interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum due tasks claimed per dispatcher batch.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ceiling on delivery attempts for tasks that don't specify one.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    /// Backoff delays in milliseconds, indexed by failure count and
    /// clamped to the last entry.
    #[serde(default = "default_backoff_table_ms")]
    pub backoff_table_ms: Vec<u64>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_batch_limit() -> u32 {
    DEFAULT_BATCH_LIMIT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_table_ms() -> Vec<u64> {
    DEFAULT_BACKOFF_TABLE_MS.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_limit: default_batch_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            default_max_attempts: default_max_attempts(),
            backoff_table_ms: default_backoff_table_ms(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults
    /// when the file does not exist. Environment variables override file
    /// values.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from HOOKRELAY_* environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("HOOKRELAY_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(interval) = env_u64("HOOKRELAY_POLL_INTERVAL_MS") {
            self.poll_interval_ms = interval;
        }
        if let Some(limit) = env_u32("HOOKRELAY_BATCH_LIMIT") {
            self.batch_limit = limit;
        }
        if let Some(timeout) = env_u64("HOOKRELAY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = timeout;
        }
        if let Some(max) = env_u32("HOOKRELAY_MAX_ATTEMPTS") {
            self.default_max_attempts = max;
        }
    }

    /// The backoff table as durations. An empty configured table falls
    /// back to the built-in default so the dispatcher always has at
    /// least one delay to apply.
    pub fn backoff_table(&self) -> Vec<Duration> {
        let table = if self.backoff_table_ms.is_empty() {
            DEFAULT_BACKOFF_TABLE_MS.to_vec()
        } else {
            self.backoff_table_ms.clone()
        };
        table.into_iter().map(Duration::from_millis).collect()
    }

    /// Per-attempt HTTP timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Scheduler tick interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.default_max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.backoff_table_ms, DEFAULT_BACKOFF_TABLE_MS.to_vec());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "batch_limit": 25
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.batch_limit, 25);
        // Fields absent from the file keep their defaults
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_config_load_from_file_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, "{not json").unwrap();

        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            poll_interval_ms: 250,
            backoff_table_ms: vec![500, 2_000],
            ..Default::default()
        };

        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.poll_interval_ms, 250);
        assert_eq!(loaded.backoff_table_ms, vec![500, 2_000]);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.batch_limit, DEFAULT_BATCH_LIMIT);
    }

    #[test]
    fn test_backoff_table_durations() {
        let config = Config::default();
        let table = config.backoff_table();
        assert_eq!(table.len(), 5);
        assert_eq!(table[0], Duration::from_secs(1));
        assert_eq!(table[4], Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_table_empty_falls_back_to_default() {
        let config = Config {
            backoff_table_ms: vec![],
            ..Default::default()
        };

        let table = config.backoff_table();
        assert_eq!(table.len(), DEFAULT_BACKOFF_TABLE_MS.len());
        assert_eq!(table[0], Duration::from_secs(1));
    }

    #[test]
    fn test_config_env_override_log_level() {
        std::env::set_var("HOOKRELAY_LOG_LEVEL", "warn");

        let config = Config::new();
        assert_eq!(config.log_level, "warn");

        std::env::remove_var("HOOKRELAY_LOG_LEVEL");
    }

    #[test]
    fn test_config_env_override_ignores_unparseable() {
        std::env::set_var("HOOKRELAY_BATCH_LIMIT", "not-a-number");

        let config = Config::new();
        assert_eq!(config.batch_limit, DEFAULT_BATCH_LIMIT);

        std::env::remove_var("HOOKRELAY_BATCH_LIMIT");
    }
}
