//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::assert::RetryStrategy;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Log assertion polling settings
    #[serde(default)]
    pub assertion: AssertionConfig,

    /// Session isolation settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Variables added to every session's environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Backoff settings for `errlogwait`
#[derive(Debug, Deserialize, Clone)]
pub struct AssertionConfig {
    /// Delay before the second poll attempt
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after every attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Give up after this long without a match
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            backoff_factor: default_backoff_factor(),
            deadline_secs: default_deadline(),
        }
    }
}

fn default_initial_delay() -> u64 {
    10
}
fn default_backoff_factor() -> f64 {
    1.5
}
fn default_deadline() -> u64 {
    30
}

impl AssertionConfig {
    /// Build the retry strategy described by these settings
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
            Duration::from_secs(self.deadline_secs),
        )
    }
}

/// Session isolation settings
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Directory under which per-session work directories are created
    /// (defaults to the system temp dir)
    pub workdir_root: Option<PathBuf>,

    /// Leave work directories on disk after the run
    #[serde(default)]
    pub keep_workdirs: bool,

    /// Mirror each session log to a file under the session work dir's parent
    #[serde(default)]
    pub log_sessions: bool,

    /// Names of variables copied from the harness's own environment
    #[serde(default)]
    pub passthrough_env: Vec<String>,

    /// How long a program may keep running once its script has passed
    /// before it is stopped
    #[serde(default = "default_quit_grace")]
    pub quit_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workdir_root: None,
            keep_workdirs: false,
            log_sessions: false,
            passthrough_env: Vec::new(),
            quit_grace_ms: default_quit_grace(),
        }
    }
}

fn default_quit_grace() -> u64 {
    2000
}

impl Config {
    /// Load configuration from an explicit path, or the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => config_path().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let factor = self.assertion.backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            return Err(super::Error::Config(format!(
                "assertion.backoff_factor must be >= 1.0, got {}",
                factor
            )));
        }
        if self.assertion.initial_delay_ms == 0 {
            return Err(super::Error::Config(
                "assertion.initial_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
