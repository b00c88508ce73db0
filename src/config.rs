//! Merge layer configuration
//!
//! Defaults, TOML loading, and `MERGE_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// What to do when a consumer callback panics during fan-out or drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and keep delivering to the remaining listeners/calls.
    #[default]
    Isolate,
    /// Stop delivering and propagate the panic; undelivered calls are dropped.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "abort" => Ok(Self::Abort),
            other => anyhow::bail!("unknown failure policy: {}", other),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl MergeConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `MERGE_CONFIG_PATH` (or `merge_config.toml`), then apply
    /// environment overrides.
    pub fn from_env() -> Self {
        let path =
            std::env::var("MERGE_CONFIG_PATH").unwrap_or_else(|_| "merge_config.toml".to_string());

        let mut cfg = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default merge config ({}): {}", path, e);
            Self::default()
        });
        cfg.apply_env_overrides();
        cfg
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MERGE_LISTENER_PASS_THROUGH") {
            if let Ok(b) = v.parse() {
                self.listener.start_in_pass_through = b;
            }
        }
        if let Ok(v) = std::env::var("MERGE_RETAIN_LATEST_CYCLE") {
            if let Ok(b) = v.parse() {
                self.listener.retain_latest_cycle = b;
            }
        }
        if let Ok(v) = std::env::var("MERGE_REPLAY_FAILURE_POLICY") {
            match v.parse() {
                Ok(policy) => self.listener.replay_failure_policy = policy,
                Err(e) => tracing::warn!("Ignoring MERGE_REPLAY_FAILURE_POLICY: {}", e),
            }
        }
        if let Ok(v) = std::env::var("MERGE_PROVIDER_PASS_THROUGH") {
            if let Ok(b) = v.parse() {
                self.provider.start_in_pass_through = b;
            }
        }
        if let Ok(v) = std::env::var("MERGE_LISTENER_FAILURE_POLICY") {
            match v.parse() {
                Ok(policy) => self.provider.listener_failure_policy = policy,
                Err(e) => tracing::warn!("Ignoring MERGE_LISTENER_FAILURE_POLICY: {}", e),
            }
        }
    }
}

/// Call-coalescing listener adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// New connections forward live until asked to merge
    #[serde(default = "default_true")]
    pub start_in_pass_through: bool,

    /// Pin the cycle behind the latest full result while it is pending
    #[serde(default)]
    pub retain_latest_cycle: bool,

    #[serde(default)]
    pub replay_failure_policy: FailurePolicy,
}

fn default_true() -> bool {
    true
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            start_in_pass_through: true,
            retain_latest_cycle: false,
            replay_failure_policy: FailurePolicy::Isolate,
        }
    }
}

/// Generic update provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub start_in_pass_through: bool,

    #[serde(default)]
    pub listener_failure_policy: FailurePolicy,
}
