//! Settings loading with multi-layer merge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level llm-flow settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Retry policy for executors wrapped with `with_retry`
    #[serde(default)]
    pub retry: RetrySettings,

    /// LLM backend definitions
    #[serde(default)]
    pub backends: HashMap<String, BackendSettings>,
}

/// Global default settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Run timeout in seconds (none = wait forever)
    pub timeout: Option<u64>,

    /// Abort parallel siblings once one member fails
    #[serde(default)]
    pub cancel_siblings: bool,
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_backoff() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl RetrySettings {
    /// Reject values that would make backoff shrink, go negative, or never end
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            );
        }
        if self.initial_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.initial_delay_ms,
                self.max_delay_ms
            );
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff(),
            jitter: true,
        }
    }
}

/// Configuration for a single LLM backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    /// Program to execute, or base URL for OpenAI-compatible endpoints
    pub command: String,

    /// Arguments placed before the prompt (CLI backends)
    #[serde(default)]
    pub args: Vec<String>,

    /// Whether this backend is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout in seconds for requests
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Model name (HTTP backends)
    pub model: Option<String>,

    /// Environment variable holding the API key (HTTP backends)
    pub api_key_env: Option<String>,

    /// Additional environment variables for the command
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    300
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            enabled: true,
            timeout: default_timeout(),
            model: None,
            api_key_env: None,
            env: HashMap::new(),
        }
    }
}

impl BackendSettings {
    /// Returns true if this is an HTTP endpoint
    pub fn is_http(&self) -> bool {
        self.command.starts_with("http://") || self.command.starts_with("https://")
    }
}

impl Settings {
    /// Load settings from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/llm-flow/config.toml
    /// 3. .llm-flow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                settings.merge(Self::load_file(&user_path)?);
            }
        }

        let project_path = project_dir
            .map(|p| p.join(".llm-flow/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".llm-flow/config.toml"));

        if project_path.exists() {
            settings.merge(Self::load_file(&project_path)?);
        }

        Ok(settings)
    }

    /// Load settings from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        settings
            .retry
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Get the user settings path (~/.config/llm-flow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("llm-flow/config.toml"))
    }

    /// Merge another layer into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.timeout.is_some() {
            self.defaults.timeout = other.defaults.timeout;
        }
        if other.defaults.cancel_siblings {
            self.defaults.cancel_siblings = true;
        }
        if other.retry != RetrySettings::default() {
            self.retry = other.retry;
        }
        for (name, backend) in other.backends {
            self.backends.insert(name, backend);
        }
    }

    /// Enabled backends, sorted by name
    pub fn enabled_backends(&self) -> Vec<(&str, &BackendSettings)> {
        let mut backends: Vec<_> = self
            .backends
            .iter()
            .filter(|(_, b)| b.enabled)
            .map(|(name, b)| (name.as_str(), b))
            .collect();
        backends.sort_by_key(|(name, _)| *name);
        backends
    }
}
