//! Configuration loading and management
//!
//! Handles parsing of `.worklog.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assignment::parse_duration;
use crate::catalog::TaskStatus;
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Name of the configuration file at the worklog root
pub const CONFIG_FILENAME: &str = ".worklog.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// User identity configuration
    #[serde(default)]
    pub user: UserConfig,

    /// Lock wait configuration
    #[serde(default)]
    pub locks: LockConfig,

    /// Defaults for new assignments
    #[serde(default)]
    pub assignments: AssignmentsConfig,

    /// Defaults for new tasks
    #[serde(default)]
    pub tasks: TasksConfig,
}

/// User-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Default user name when none specified
    #[serde(default = "default_user")]
    pub default: String,
}

fn default_user() -> String {
    "unknown".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            default: default_user(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a start/stop waits for a busy assignment before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentsConfig {
    /// Workload cap for new assignments ("0s" = no cap)
    #[serde(default = "default_max_workload")]
    pub default_max_workload: String,

    /// Whether new assignments may log time
    #[serde(default = "default_true")]
    pub default_allowed: bool,
}

fn default_max_workload() -> String {
    "0s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AssignmentsConfig {
    fn default() -> Self {
        Self {
            default_max_workload: default_max_workload(),
            default_allowed: default_true(),
        }
    }
}

impl AssignmentsConfig {
    pub fn max_workload(&self) -> crate::error::Result<Duration> {
        parse_duration(&self.default_max_workload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Status of newly created tasks
    #[serde(default = "default_task_status")]
    pub default_status: String,
}

fn default_task_status() -> String {
    TaskStatus::Started.to_string()
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_status: default_task_status(),
        }
    }
}

impl TasksConfig {
    pub fn status(&self) -> crate::error::Result<TaskStatus> {
        self.default_status.parse()
    }
}

impl Config {
    /// Load configuration from a `.worklog.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the worklog root, or return defaults
    pub fn load_from_root(root: &Path) -> Self {
        let config_path = config_path(root);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.user.default.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "user.default cannot be empty".to_string(),
            ));
        }
        if self.locks.timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "locks.timeout_ms must be > 0".to_string(),
            ));
        }
        self.assignments.max_workload().map_err(|err| {
            crate::error::Error::InvalidConfig(format!(
                "assignments.default_max_workload: {err}"
            ))
        })?;
        self.tasks.status().map_err(|err| {
            crate::error::Error::InvalidConfig(format!("tasks.default_status: {err}"))
        })?;
        Ok(())
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILENAME)
}
