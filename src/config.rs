use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::RoleRegistry;
use crate::{clog_debug, Error, Result};

/// Default number of checkpoint retries before a plan escalates.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default ceiling on tasks admitted into one phase.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default number of pending tasks listed in a continuation directive.
pub const DEFAULT_CONTINUATION_LIMIT: usize = 5;

/// Default time an executing task may run before it is reported as stalled.
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 300;

const DEFAULT_STATE_DIR: &str = ".conductor";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_retries: u32,
    pub max_parallel: usize,
    /// Force every plan onto the sequential strategy.
    pub sequential: bool,
    pub continuation_limit: usize,
    pub stall_threshold_secs: u64,
    /// Name of the per-workspace state directory.
    pub state_dir: Option<String>,
    /// Per-role concurrency overrides keyed by role name.
    pub concurrency: BTreeMap<String, u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_parallel: DEFAULT_MAX_PARALLEL,
            sequential: false,
            continuation_limit: DEFAULT_CONTINUATION_LIMIT,
            stall_threshold_secs: DEFAULT_STALL_THRESHOLD_SECS,
            state_dir: None,
            concurrency: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::conductor_dir()?.join("conductor.toml"))
    }

    /// Directory holding the plan document for `workspace`.
    pub fn state_dir_for(&self, workspace: &Path) -> PathBuf {
        workspace.join(self.state_dir.as_deref().unwrap_or(DEFAULT_STATE_DIR))
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    /// Built-in role table with this config's concurrency overrides applied.
    pub fn role_registry(&self) -> RoleRegistry {
        RoleRegistry::builtin().with_limit_overrides(&self.concurrency)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        clog_debug!(
            "Config loaded: max_retries={}, max_parallel={}, sequential={}, overrides={:?}",
            config.max_retries,
            config.max_parallel,
            config.sequential,
            config.concurrency
        );
        Ok(config)
    }

    /// Render as the TOML `conductor.toml` expects.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write to `~/.conductor/conductor.toml`.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                clog_debug!("Creating config directory {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
