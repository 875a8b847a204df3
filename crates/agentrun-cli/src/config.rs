//! Run configuration.
//!
//! Read once from the environment before any task starts; every task of a
//! batch sees the same values.

use std::time::Duration;

use agentrun_core::BackendKind;
use agentrun_sdk::BackendOptions;
use thiserror::Error;

/// Pass the backend's sandbox/permission bypass flag (default `true`).
pub const ENV_BYPASS_SANDBOX: &str = "AGENTRUN_BYPASS_SANDBOX";
/// Per-task timeout in seconds (default 7200).
pub const ENV_TIMEOUT: &str = "AGENTRUN_TIMEOUT";
/// Batch concurrency bound, 0 for unbounded (default 0).
pub const ENV_MAX_PARALLEL: &str = "AGENTRUN_MAX_PARALLEL";
/// Backend used when a task names none (default `codex`).
pub const ENV_BACKEND: &str = "AGENTRUN_BACKEND";

/// Errors reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Pass sandbox/permission bypass flags to backends.
    pub bypass_sandbox: bool,

    /// Per-task timeout.
    pub timeout: Duration,

    /// Maximum concurrently running tasks in batch mode. 0 = unbounded.
    pub max_parallel: usize,

    /// Backend for tasks that do not name one.
    pub default_backend: BackendKind,

    /// Model override passed to every backend.
    pub model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bypass_sandbox: true,
            timeout: Duration::from_secs(7200),
            max_parallel: 0,
            default_backend: BackendKind::Codex,
            model: None,
        }
    }
}

impl Config {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Unset or blank values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_BYPASS_SANDBOX) {
            config.bypass_sandbox = parse_bool(&value).ok_or(ConfigError::InvalidValue {
                key: ENV_BYPASS_SANDBOX,
                value,
            })?;
        }
        if let Some(value) = get(ENV_TIMEOUT) {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_TIMEOUT,
                    value: value.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(value) = get(ENV_MAX_PARALLEL) {
            config.max_parallel =
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_MAX_PARALLEL,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = get(ENV_BACKEND) {
            config.default_backend =
                value
                    .parse::<BackendKind>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_BACKEND,
                        value: value.clone(),
                    })?;
        }

        Ok(config)
    }

    /// Adapter-facing options.
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            bypass_sandbox: self.bypass_sandbox,
            model: self.model.clone(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
