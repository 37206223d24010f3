use crate::{DEFAULT_HISTORY_CAPACITY, SidecarError};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main sidecar configuration
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into, strip_option))]
pub struct SidecarConfig {
    /// Executable that runs the watcher process
    pub watcher_command: String,

    /// Arguments passed to the watcher
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub watcher_args: Vec<String>,

    /// Working directory for the watcher (inherited if unset)
    #[builder(default)]
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Extra environment variables for the watcher
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Local port the HTTP control surface binds to
    #[builder(default = "default_bind_port()")]
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Bounded wait for cooperative termination before the forceful kill
    #[builder(default = "default_grace_period_ms()")]
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Number of captured lines retained for replay
    #[builder(default = "default_history_capacity()")]
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Per-subscriber channel headroom beyond a full history replay
    #[builder(default = "default_subscriber_buffer()")]
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Bounded HTTP drain after the shutdown command, before forced exit
    #[builder(default = "default_drain_timeout_ms()")]
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Idle interval after which a log subscriber receives a keepalive line
    #[builder(default = "default_keepalive_secs()")]
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Directory holding the watcher's tabular output files
    #[builder(default)]
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl SidecarConfig {
    pub fn builder() -> SidecarConfigBuilder {
        SidecarConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), SidecarError> {
        if self.watcher_command.is_empty() {
            return Err(SidecarError::ConfigurationError(
                "watcher_command must not be empty".to_string(),
            ));
        }

        if self.bind_port == 0 {
            return Err(SidecarError::ConfigurationError(
                "bind_port must be non-zero".to_string(),
            ));
        }

        if self.history_capacity == 0 {
            return Err(SidecarError::ConfigurationError(
                "history_capacity must be at least 1".to_string(),
            ));
        }

        if self.grace_period_ms > 60_000 {
            return Err(SidecarError::ConfigurationError(
                "grace_period_ms should not exceed 60 seconds".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the termination grace period as Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Get the HTTP drain timeout as Duration
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Get the subscriber keepalive interval as Duration
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl SidecarConfigBuilder {
    pub fn watcher_args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.watcher_args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde and the builder
fn default_bind_port() -> u16 {
    61125
}
fn default_grace_period_ms() -> u64 {
    5_000
}
fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}
fn default_subscriber_buffer() -> usize {
    64
}
fn default_drain_timeout_ms() -> u64 {
    2_000
}
fn default_keepalive_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SidecarConfig {
        SidecarConfig::builder()
            .watcher_command("echo")
            .watcher_args(["hello"])
            .build()
            .expect("Failed to build SidecarConfig")
    }

    #[test]
    fn test_default_values() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_port, 61125);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.history_capacity, 1000);
        assert!(config.working_directory.is_none());
    }

    #[test]
    fn test_builder_env() {
        let config = SidecarConfig::builder()
            .watcher_command("python3")
            .watcher_args(["fluctuation.py"])
            .env("PYTHONUNBUFFERED", "1")
            .build()
            .unwrap();

        assert_eq!(config.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert_eq!(config.watcher_args, vec!["fluctuation.py".to_string()]);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = base_config();
        config.bind_port = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.grace_period_ms = 120_000;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.watcher_command = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SidecarConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_serde_defaults() {
        let config: SidecarConfig =
            serde_json::from_str(r#"{"watcherCommand": "python3"}"#).unwrap();
        assert_eq!(config.bind_port, 61125);
        assert_eq!(config.grace_period_ms, 5_000);
        assert_eq!(config.history_capacity, 1000);
    }
}
