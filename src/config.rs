//! Startup configuration.
//!
//! Loaded once from a TOML file; there is no hot reload.
//!
//! ```toml
//! [auth]
//! username = "admin"
//! password = "secret"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [logs]
//! directories = "/var/log/app,/srv/logs"
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "monitor_config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("logs.directories must name at least one directory")]
    NoDirectories,

    #[error("auth.username must not be empty")]
    EmptyUsername,

    #[error("server.subscriber_buffer must be at least 1")]
    ZeroSubscriberBuffer,

    #[error("server.{0} must be at least 1 second")]
    ZeroTimeout(&'static str),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logs: LogsConfig,
}

/// The single shared credential every request must carry.
#[derive(Clone, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the viewer UI.
    pub static_dir: PathBuf,
    /// Messages queued per viewer before it is dropped as too slow.
    pub subscriber_buffer: usize,
    /// Upper bound on serving one static asset request.
    pub request_timeout_secs: u64,
    /// Upper bound on writing one frame to a viewer.
    pub write_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_write_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("./static"),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            request_timeout_secs: default_request_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LogsConfig {
    directories: Directories,
}

/// Either a comma-separated string or a TOML array.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum Directories {
    Joined(String),
    List(Vec<String>),
}

impl LogsConfig {
    /// Returns the configured roots, trimmed, with empty entries dropped.
    pub fn directories(&self) -> Vec<PathBuf> {
        let entries: Vec<&str> = match &self.directories {
            Directories::Joined(joined) => joined.split(',').collect(),
            Directories::List(list) => list.iter().map(String::as_str).collect(),
        };

        entries
            .into_iter()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}

impl Config {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        contents.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.server.subscriber_buffer == 0 {
            return Err(ConfigError::ZeroSubscriberBuffer);
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("request_timeout_secs"));
        }
        if self.server.write_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("write_timeout_secs"));
        }
        if self.logs.directories().is_empty() {
            return Err(ConfigError::NoDirectories);
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
