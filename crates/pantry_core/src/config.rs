//! Runtime configuration for the pantry core.
//!
//! # Invariants
//! - A validated config has a non-empty owner id and a positive timeout.
//! - `log_dir`, when present, is an absolute path.

use crate::logging::{default_log_level, parse_level};
use crate::model::record::OwnerId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug)]
pub enum ConfigError {
    EmptyOwnerId,
    ZeroTimeout,
    UnsupportedLogLevel(String),
    RelativeLogDir(PathBuf),
    Read { path: PathBuf, message: String },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyOwnerId => write!(f, "owner_id must not be empty"),
            Self::ZeroTimeout => write!(f, "remote_timeout_ms must be greater than zero"),
            Self::UnsupportedLogLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeLogDir(path) => {
                write!(f, "log_dir must be absolute, got `{}`", path.display())
            }
            Self::Read { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings for one signed-in pantry session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PantryConfig {
    pub owner_id: String,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    #[serde(default = "default_level_string")]
    pub log_level: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl PantryConfig {
    /// Builds a config with defaults for everything but the owner.
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            log_level: default_level_string(),
            log_dir: None,
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_id.trim().is_empty() {
            return Err(ConfigError::EmptyOwnerId);
        }
        if self.remote_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if parse_level(&self.log_level).is_none() {
            return Err(ConfigError::UnsupportedLogLevel(self.log_level.clone()));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }
        Ok(())
    }

    pub fn owner(&self) -> OwnerId {
        OwnerId::new(self.owner_id.trim())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

fn default_level_string() -> String {
    default_log_level().to_string()
}
