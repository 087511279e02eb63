//! Top-level pipeline configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandDef;
use crate::error::ConfigError;

const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SIGNAL_BUFFER: usize = 100;

/// Where the fetch stage writes its artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationDef {
  pub bucket: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  /// Wall-clock bound for a whole execution, dispatch through notify.
  #[serde(default = "default_execution_timeout_ms")]
  pub execution_timeout_ms: u64,
  /// Bound for a single notify invocation. Must be shorter than the
  /// execution timeout.
  #[serde(default = "default_notify_timeout_ms")]
  pub notify_timeout_ms: u64,
  /// Capacity of the inbound signal channel.
  #[serde(default = "default_signal_buffer")]
  pub signal_buffer: usize,
  pub artifact_destination: DestinationDef,
  /// Reference (not the value) of the credentials the executor should load.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub credentials_ref: Option<String>,
  pub executor: CommandDef,
  pub notifier: CommandDef,
}

fn default_execution_timeout_ms() -> u64 {
  DEFAULT_EXECUTION_TIMEOUT_MS
}

fn default_notify_timeout_ms() -> u64 {
  DEFAULT_NOTIFY_TIMEOUT_MS
}

fn default_signal_buffer() -> usize {
  DEFAULT_SIGNAL_BUFFER
}

impl PipelineConfig {
  /// Load and validate a config file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Parse and validate a JSON document.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: PipelineConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.execution_timeout_ms == 0 {
      return Err(ConfigError::invalid("execution_timeout_ms must be positive"));
    }
    if self.notify_timeout_ms == 0 {
      return Err(ConfigError::invalid("notify_timeout_ms must be positive"));
    }
    if self.notify_timeout_ms >= self.execution_timeout_ms {
      return Err(ConfigError::invalid(format!(
        "notify_timeout_ms ({}) must be shorter than execution_timeout_ms ({})",
        self.notify_timeout_ms, self.execution_timeout_ms
      )));
    }
    if self.signal_buffer == 0 {
      return Err(ConfigError::invalid("signal_buffer must be positive"));
    }
    if self.artifact_destination.bucket.trim().is_empty() {
      return Err(ConfigError::invalid("artifact_destination.bucket is empty"));
    }
    if self.executor.program.trim().is_empty() {
      return Err(ConfigError::invalid("executor.program is empty"));
    }
    if self.notifier.program.trim().is_empty() {
      return Err(ConfigError::invalid("notifier.program is empty"));
    }
    Ok(())
  }

  pub fn execution_timeout(&self) -> Duration {
    Duration::from_millis(self.execution_timeout_ms)
  }

  pub fn notify_timeout(&self) -> Duration {
    Duration::from_millis(self.notify_timeout_ms)
  }
}
