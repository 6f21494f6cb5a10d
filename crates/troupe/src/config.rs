//! # System Configuration
//!
//! Settings for an [`ActorSystem`](crate::ActorSystem), loadable from TOML.
//!
//! ```toml
//! name = "orchestrator"
//! ask_timeout_ms = 10000
//! terminate_timeout_ms = 2000
//! undeliverable = "dead_letters"
//!
//! [logging]
//! level = "debug"
//! stdout = true
//! file = "logs/troupe.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::actor::types::{DEFAULT_ASK_TIMEOUT, DEFAULT_TERMINATE_TIMEOUT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    /// Name used in log output and timeout errors
    pub name: String,
    /// Default deadline for `ActorRef::ask`
    pub ask_timeout_ms: u64,
    /// Default deadline for `ActorSystem::shutdown`
    pub terminate_timeout_ms: u64,
    /// What happens to messages sent to a terminated actor
    pub undeliverable: UndeliverablePolicy,
    pub logging: LoggingConfig,
}

/// Routing of messages addressed to an actor that has already terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UndeliverablePolicy {
    /// Log a warning and drop the message
    #[default]
    Drop,
    /// Forward the message to `/system/deadLetters`
    DeadLetters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub stdout: bool,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout: true,
            file: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "troupe".to_string(),
            ask_timeout_ms: DEFAULT_ASK_TIMEOUT.as_millis() as u64,
            terminate_timeout_ms: DEFAULT_TERMINATE_TIMEOUT.as_millis() as u64,
            undeliverable: UndeliverablePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Loads a configuration from a TOML file.
    ///
    /// ## Returns
    ///
    /// * `Ok(SystemConfig)` - The parsed configuration, with defaults for missing keys
    /// * `Err(anyhow::Error)` - If the file cannot be read or contains invalid TOML
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SystemConfig = toml::from_str(content)?;
        if config.name.trim().is_empty() {
            anyhow::bail!("system name must not be empty");
        }
        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_undeliverable(mut self, policy: UndeliverablePolicy) -> Self {
        self.undeliverable = policy;
        self
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}
