//! Configuration loading for sync-bridge.
//!
//! Configuration is optional. When `chainsync_init` is given a path it is
//! loaded from that TOML file; otherwise every value takes its default.

use chainsync_core::PollTimeout;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for sync-bridge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    /// Poll timeout policy.
    #[serde(default)]
    pub poll: PollConfig,
    /// One-shot lookup timeouts.
    #[serde(default)]
    pub lookup: LookupConfig,
    /// Engine runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Poll timeout policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Wait used when a poll passes a non-positive timeout (default: 1000).
    #[serde(default = "default_poll_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Longest a single poll may block (default: 300000 = 5 minutes).
    #[serde(default = "default_poll_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

/// One-shot lookup timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// Tip lookup timeout when the caller passes none (default: 30000).
    #[serde(default = "default_lookup_timeout_ms")]
    pub tip_timeout_ms: u64,
    /// Peer discovery timeout when the caller passes none (default: 30000).
    #[serde(default = "default_lookup_timeout_ms")]
    pub peer_timeout_ms: u64,
}

/// Engine runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads for engine tasks (default: 2).
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Name given to worker threads (default: "chainsync-engine").
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_poll_timeout_ms() -> u64 {
    chainsync_core::DEFAULT_POLL_TIMEOUT_MS
}

fn default_poll_max_timeout_ms() -> u64 {
    chainsync_core::MAX_POLL_TIMEOUT_MS
}

fn default_lookup_timeout_ms() -> u64 {
    30_000
}

fn default_worker_threads() -> usize {
    2
}

fn default_thread_name() -> String {
    "chainsync-engine".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_poll_timeout_ms(),
            max_timeout_ms: default_poll_max_timeout_ms(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            tip_timeout_ms: default_lookup_timeout_ms(),
            peer_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.default_timeout_ms must be positive".to_string(),
            ));
        }
        if self.poll.max_timeout_ms < self.poll.default_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "poll.max_timeout_ms ({}) is below poll.default_timeout_ms ({})",
                self.poll.max_timeout_ms, self.poll.default_timeout_ms
            )));
        }
        if self.lookup.tip_timeout_ms == 0 || self.lookup.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lookup timeouts must be positive".to_string(),
            ));
        }
        if self.runtime.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "runtime.worker_threads must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll timeout policy derived from `[poll]`.
    pub fn poll_timeout(&self) -> PollTimeout {
        PollTimeout::new(self.poll.default_timeout_ms, self.poll.max_timeout_ms)
    }

    /// Resolve a caller-supplied tip lookup timeout.
    pub fn tip_timeout(&self, requested_ms: i64) -> Duration {
        lookup_timeout(requested_ms, self.lookup.tip_timeout_ms)
    }

    /// Resolve a caller-supplied peer discovery timeout.
    pub fn peer_timeout(&self, requested_ms: i64) -> Duration {
        lookup_timeout(requested_ms, self.lookup.peer_timeout_ms)
    }
}

fn lookup_timeout(requested_ms: i64, default_ms: u64) -> Duration {
    if requested_ms > 0 {
        Duration::from_millis(requested_ms as u64)
    } else {
        Duration::from_millis(default_ms)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Values parsed but are unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll.default_timeout_ms, 1000);
        assert_eq!(config.poll.max_timeout_ms, 300_000);
        assert_eq!(config.lookup.tip_timeout_ms, 30_000);
        assert_eq!(config.runtime.worker_threads, 2);
        assert_eq!(config.runtime.thread_name, "chainsync-engine");
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[poll]
default_timeout_ms = 250
max_timeout_ms = 60000

[lookup]
tip_timeout_ms = 5000

[runtime]
worker_threads = 4
thread_name = "sync-worker"

[logging]
filter = "chainsync_bridge=debug"
"#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll.default_timeout_ms, 250);
        assert_eq!(config.poll.max_timeout_ms, 60000);
        assert_eq!(config.lookup.tip_timeout_ms, 5000);
        assert_eq!(config.lookup.peer_timeout_ms, 30_000);
        assert_eq!(config.runtime.worker_threads, 4);
        assert_eq!(config.runtime.thread_name, "sync-worker");
        assert_eq!(config.logging.filter, "chainsync_bridge=debug");
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll.default_timeout_ms, 1000);
        assert_eq!(config.runtime.worker_threads, 2);
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poll]\ndefault_timeout_ms = 500").unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll.default_timeout_ms, 500);
    }

    #[test]
    fn from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poll]\ndefault_timeout_ms = 5000\nmax_timeout_ms = 10").unwrap();

        let err = BridgeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poll\nnot toml").unwrap();

        let err = BridgeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = BridgeConfig::default();
        config.runtime.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn lookup_timeouts_fall_back_to_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.tip_timeout(0), Duration::from_millis(30_000));
        assert_eq!(config.tip_timeout(-1), Duration::from_millis(30_000));
        assert_eq!(config.peer_timeout(1500), Duration::from_millis(1500));
    }

    #[test]
    fn poll_policy_follows_config() {
        let mut config = BridgeConfig::default();
        config.poll.default_timeout_ms = 50;
        config.poll.max_timeout_ms = 100;
        let policy = config.poll_timeout();
        assert_eq!(policy.resolve(0), Duration::from_millis(50));
        assert_eq!(policy.resolve(1_000_000), Duration::from_millis(100));
    }
}
