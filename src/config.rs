//! Host configuration loaded from TOML.
//!
//! Lookup order: an explicit `--config` path, then
//! `<config dir>/warden/config.toml` if it exists, then built-in defaults.
//! `WARDEN_SANDBOXED_SLOTS` and `WARDEN_PRIVILEGED_SLOTS` override the slot
//! counts from any source. The result is validated before use.

use crate::error::{Result, WardenError};
use crate::launcher::{BindingStrength, WorkerClass};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the sandboxed slot count.
pub const SANDBOXED_SLOTS_ENV: &str = "WARDEN_SANDBOXED_SLOTS";
/// Environment variable overriding the privileged slot count.
pub const PRIVILEGED_SLOTS_ENV: &str = "WARDEN_PRIVILEGED_SLOTS";

/// `oom_score_adj` values applied for each binding strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveScores {
    pub strong: i32,
    pub moderate: i32,
    pub none: i32,
}

impl Default for KeepAliveScores {
    fn default() -> Self {
        Self {
            strong: 0,
            moderate: 300,
            none: 900,
        }
    }
}

impl KeepAliveScores {
    pub fn score_for(&self, strength: BindingStrength) -> i32 {
        match strength {
            BindingStrength::Strong => self.strong,
            BindingStrength::Moderate => self.moderate,
            BindingStrength::None => self.none,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum concurrent sandboxed workers.
    pub sandboxed_slots: usize,
    /// Maximum concurrent privileged workers.
    pub privileged_slots: usize,
    /// Binary to run as the worker. Defaults to the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_executable: Option<PathBuf>,
    pub handshake_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub exit_poll_interval_ms: u64,
    /// Start a spare sandboxed worker once full startup completes.
    pub warm_up_on_full_start: bool,
    /// Treat every importance update as background.
    pub ignore_visibility_for_importance: bool,
    pub keep_alive: KeepAliveScores,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sandboxed_slots: 8,
            privileged_slots: 2,
            worker_executable: None,
            handshake_timeout_ms: 10_000,
            stop_timeout_ms: 500,
            exit_poll_interval_ms: 250,
            warm_up_on_full_start: false,
            ignore_visibility_for_importance: false,
            keep_alive: KeepAliveScores::default(),
        }
    }
}

impl HostConfig {
    /// Load, apply environment overrides, and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(&paths::expand_tilde(path))?,
            None => {
                let path = paths::get_config_path();
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply slot-count overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(SANDBOXED_SLOTS_ENV) {
            self.sandboxed_slots = parse_slots(SANDBOXED_SLOTS_ENV, &value)?;
        }
        if let Some(value) = lookup(PRIVILEGED_SLOTS_ENV) {
            self.privileged_slots = parse_slots(PRIVILEGED_SLOTS_ENV, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for class in WorkerClass::ALL {
            if self.capacity(class) == 0 {
                return Err(WardenError::InvalidConfig(format!(
                    "{}_slots must be at least 1",
                    class
                )));
            }
        }
        for (name, value) in [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("exit_poll_interval_ms", self.exit_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(WardenError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let scores = &self.keep_alive;
        for (name, value) in [
            ("strong", scores.strong),
            ("moderate", scores.moderate),
            ("none", scores.none),
        ] {
            if !(-1000..=1000).contains(&value) {
                return Err(WardenError::InvalidConfig(format!(
                    "keep_alive.{} must be within -1000..=1000, got {}",
                    name, value
                )));
            }
        }
        if scores.strong > scores.moderate || scores.moderate > scores.none {
            return Err(WardenError::InvalidConfig(
                "keep_alive scores must satisfy strong <= moderate <= none".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capacity(&self, class: WorkerClass) -> usize {
        match class {
            WorkerClass::Sandboxed => self.sandboxed_slots,
            WorkerClass::Privileged => self.privileged_slots,
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.exit_poll_interval_ms)
    }
}

fn parse_slots(name: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        WardenError::InvalidConfig(format!(
            "{} must be a non-negative integer, got {:?}",
            name, value
        ))
    })
}
