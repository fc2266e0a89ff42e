//! Pipeline configuration
//!
//! Defaults come from the environment (`DECK_POOL_SIZE`, `DECK_RETRY_CEILING`,
//! `DECK_TOOL_TIMEOUT_SECS`, `DECK_STATE_DIR`); a TOML file with the same keys
//! can override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Hard upper bound on attempts per task between resets
pub const MAX_ATTEMPTS: u32 = 5;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("pool_size must be at least 1")]
    ZeroPoolSize,

    #[error("tool_timeout_secs must be at least 1")]
    ZeroToolTimeout,
}

/// Runtime settings for the worker pool and orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of concurrently running workers
    pub pool_size: usize,
    /// Attempts per task before it needs a human (at most [`MAX_ATTEMPTS`])
    pub retry_ceiling: u32,
    /// Timeout for one tool-call attempt
    pub tool_timeout: Duration,
    /// Directory for persisted tasklists; in-memory when unset
    pub state_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: env_parse("DECK_POOL_SIZE").unwrap_or(DEFAULT_POOL_SIZE),
            retry_ceiling: env_parse("DECK_RETRY_CEILING")
                .unwrap_or(MAX_ATTEMPTS)
                .clamp(1, MAX_ATTEMPTS),
            tool_timeout: Duration::from_secs(
                env_parse("DECK_TOOL_TIMEOUT_SECS").unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            ),
            state_dir: std::env::var("DECK_STATE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Keys accepted in a config file; all optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    pool_size: Option<usize>,
    retry_ceiling: Option<u32>,
    tool_timeout_secs: Option<u64>,
    state_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Defaults overlaid with the keys present in a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(pool_size) = file.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(ceiling) = file.retry_ceiling {
            config.retry_ceiling = ceiling;
        }
        if let Some(secs) = file.tool_timeout_secs {
            config.tool_timeout = Duration::from_secs(secs);
        }
        if file.state_dir.is_some() {
            config.state_dir = file.state_dir;
        }
        Ok(config)
    }

    /// Reject unusable values and clamp the retry ceiling to `1..=MAX_ATTEMPTS`.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.tool_timeout.is_zero() {
            return Err(ConfigError::ZeroToolTimeout);
        }
        self.retry_ceiling = self.retry_ceiling.clamp(1, MAX_ATTEMPTS);
        Ok(self)
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_retry_ceiling(mut self, retry_ceiling: u32) -> Self {
        self.retry_ceiling = retry_ceiling;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }
}
