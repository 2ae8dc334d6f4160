//! Configuration for sentineld.
//!
//! Loads settings from a TOML file or uses defaults. Every field has a
//! serde default so a partial file is valid; a missing file yields the
//! built-in defaults, a malformed file is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default config file path
pub const CONFIG_PATH: &str = "/etc/basin-sentinel/config.toml";

/// Health monitor thresholds and history sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minimum acceptable average phi.
    #[serde(default = "default_phi_min")]
    pub phi_min: f64,

    /// Maximum acceptable basin drift from baseline (geodesic distance).
    #[serde(default = "default_drift_max")]
    pub drift_max: f64,

    /// Snapshot history capacity (FIFO).
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Seconds between telemetry captures.
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_phi_min() -> f64 {
    0.65
}

fn default_drift_max() -> f64 {
    2.0
}

fn default_history_size() -> usize {
    1000
}

fn default_monitor_interval() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            phi_min: default_phi_min(),
            drift_max: default_drift_max(),
            history_size: default_history_size(),
            interval_secs: default_monitor_interval(),
        }
    }
}

/// Healing engine policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealerConfig {
    /// Minimum fitness score a patch needs before it may be applied.
    #[serde(default = "default_fitness_threshold")]
    pub fitness_threshold: f64,

    /// Apply qualifying patches without waiting for human review.
    #[serde(default)]
    pub auto_apply: bool,

    /// Seconds between healing passes.
    #[serde(default = "default_heal_interval")]
    pub interval_secs: u64,
}

fn default_fitness_threshold() -> f64 {
    0.6
}

fn default_heal_interval() -> u64 {
    300
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            fitness_threshold: default_fitness_threshold(),
            auto_apply: false,
            interval_secs: default_heal_interval(),
        }
    }
}

/// Target repository the apply controller operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Working tree root.
    #[serde(default = "default_repo_root")]
    pub root: PathBuf,

    /// Test command run before a patch may be committed.
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,

    /// Seconds the test command may run before it is killed. A hung
    /// suite would otherwise block the apply sequence forever.
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_test_command() -> Vec<String> {
    vec!["cargo".into(), "test".into(), "--quiet".into()]
}

fn default_test_timeout() -> u64 {
    300
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: default_repo_root(),
            test_command: default_test_command(),
            test_timeout_secs: default_test_timeout(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub healer: HealerConfig,

    #[serde(default)]
    pub repo: RepoConfig,

    /// Directory for persisted monitor/healer state.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/basin-sentinel")
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            healer: HealerConfig::default(),
            repo: RepoConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn monitor_state_path(&self) -> PathBuf {
        self.state_dir.join("monitor_history.json")
    }

    pub fn healer_state_path(&self) -> PathBuf {
        self.state_dir.join("healer_history.json")
    }
}
