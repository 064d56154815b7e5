//! Relay configuration.
//!
//! Values are resolved in this order, later sources winning:
//!
//! 1. Built-in defaults
//! 2. TOML config file (explicit path, or `<config dir>/chatrelay/relay.toml`)
//! 3. Environment (`RELAY_BIND`, `RELAY_IDLE_TIMEOUT`)
//! 4. Command-line flags (applied by the binary)
//!
//! # Example
//!
//! ```toml
//! bind = "0.0.0.0:8888"
//! idle_timeout_secs = 600
//! write_timeout_secs = 10
//! max_line_length = 4096
//! max_sessions = 1024
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_protocol::DEFAULT_MAX_LINE_LENGTH;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::session::SessionSettings;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8888";

/// Default maximum number of concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Environment variable overriding the listen address.
pub const ENV_BIND: &str = "RELAY_BIND";

/// Environment variable overriding the idle timeout (seconds).
pub const ENV_IDLE_TIMEOUT: &str = "RELAY_IDLE_TIMEOUT";

const CONFIG_DIR_NAME: &str = "chatrelay";
const CONFIG_FILE_NAME: &str = "relay.toml";

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Address the TCP listener binds to.
    pub bind: String,

    /// Seconds of inactivity before a session is forced offline.
    pub idle_timeout_secs: u64,

    /// Seconds a single outbound line may take to write.
    pub write_timeout_secs: u64,

    /// Longest accepted inbound line, in bytes.
    pub max_line_length: usize,

    /// Connections beyond this are refused.
    pub max_sessions: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            idle_timeout_secs: session.idle_timeout.as_secs(),
            write_timeout_secs: session.write_timeout.as_secs(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl RelayConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads defaults, the config file and environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used only if a file is actually there. The result is not validated:
    /// callers apply their own overrides first, then call [`Self::validate`].
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` / `ConfigError::Parse` for a bad config file
    /// - `ConfigError::Invalid` if an environment override does not parse
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&contents)
    }

    /// Parses a TOML document. Missing keys take their default.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }

        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT) {
            self.idle_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: ENV_IDLE_TIMEOUT,
                reason: format!("expected whole seconds, got {raw:?}"),
            })?;
        }

        Ok(())
    }

    /// Checks every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bind",
                reason: "must not be empty".to_string(),
            });
        }

        let positive = [
            ("idle_timeout_secs", self.idle_timeout_secs == 0),
            ("write_timeout_secs", self.write_timeout_secs == 0),
            ("max_line_length", self.max_line_length == 0),
            ("max_sessions", self.max_sessions == 0),
        ];
        for (field, is_zero) in positive {
            if is_zero {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Per-session tunables derived from this config.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: self.idle_timeout(),
            write_timeout: self.write_timeout(),
            max_line_length: self.max_line_length,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
