//! # Workspace configuration: `taskdeck.toml`
//!
//! ```toml
//! user_id = "local"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [autosave]
//! delay_ms = 1000
//!
//! [notifications]
//! max_notifications = 5
//! default_duration_ms = 5000
//!
//! [middleware]
//! log_errors = true
//! notify_on_error = true
//!
//! [persistence]
//! enabled = true
//! key_prefix = "taskdeck"
//! ```
//!
//! Every section derives `Default`, so a missing or empty file is the
//! default configuration.

use crate::middleware::RetryPolicy;
use crate::notification::QueueSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config value `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskDeckConfig {
    /// Owner scope for every backend call.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_user_id() -> String {
    "local".to_string()
}

impl Default for TaskDeckConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            retry: RetryPolicy::default(),
            autosave: AutoSaveConfig::default(),
            notifications: NotificationConfig::default(),
            middleware: MiddlewareConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_autosave_delay")]
    pub delay_ms: u64,
}

fn default_autosave_delay() -> u64 {
    1_000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_autosave_delay(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,
    #[serde(default = "default_duration_ms")]
    pub default_duration_ms: u64,
}

fn default_max_notifications() -> usize {
    5
}

fn default_duration_ms() -> u64 {
    5_000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_notifications: default_max_notifications(),
            default_duration_ms: default_duration_ms(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default = "enabled")]
    pub log_errors: bool,
    /// Post an error notification for every exhausted store call.
    #[serde(default = "enabled")]
    pub notify_on_error: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            log_errors: true,
            notify_on_error: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Namespace for every stored key, e.g. `taskdeck.tasks.view`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "taskdeck".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: default_key_prefix(),
        }
    }
}

fn enabled() -> bool {
    true
}

impl TaskDeckConfig {
    pub fn filename() -> &'static str {
        "taskdeck.toml"
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads `path`; a missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "user_id",
                message: "must not be empty".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.notifications.max_notifications == 0 {
            return Err(ConfigError::Invalid {
                field: "notifications.max_notifications",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave.delay_ms)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_notifications: self.notifications.max_notifications,
            default_duration: Duration::from_millis(self.notifications.default_duration_ms),
        }
    }

    /// Storage key for `name` under the configured prefix.
    pub fn storage_key(&self, name: &str) -> String {
        if self.persistence.key_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.persistence.key_prefix, name)
        }
    }
}
