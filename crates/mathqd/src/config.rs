//! Server configuration.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config`, or `mathq/mathqd.toml` in the user config dir)
//! 3. `MATHQ_PORT` / `MATHQ_BIND` environment variables
//! 4. command-line flags (applied by the binary)
//!
//! ```toml
//! port = 12345
//! max_sessions = 5
//! queue_capacity = 1024
//! log_file = "logs/server.log"
//! ```

use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default number of concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 5;

/// Default request queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Environment variable overriding the port.
pub const PORT_ENV: &str = "MATHQ_PORT";

/// Environment variable overriding the bind address.
pub const BIND_ENV: &str = "MATHQ_BIND";

/// Configuration for [`crate::server::MathServer`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: String,

    /// TCP port to listen on (0 picks a free port)
    pub port: u16,

    /// Maximum number of concurrent sessions; extra connections get `ERR:Server busy`
    pub max_sessions: usize,

    /// Maximum number of queued CALC requests; extra requests get `ERR:Server busy`
    pub queue_capacity: usize,

    /// Idle sessions are closed after this many seconds without a line
    pub read_timeout_secs: u64,

    /// A single response write must finish within this many seconds
    pub write_timeout_secs: u64,

    /// Longest accepted protocol line in bytes
    pub max_line_length: usize,

    /// Event log file; empty disables the file sink
    pub log_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
            max_line_length: 64 * 1024,
            log_file: PathBuf::from("logs/server.log"),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, an optional TOML file and the environment.
    ///
    /// With `path == None` the default config file is read only if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(
            env::var(PORT_ENV).ok().as_deref(),
            env::var(BIND_ENV).ok().as_deref(),
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses TOML text; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies port and bind address overrides given as text.
    pub fn apply_overrides(
        &mut self,
        port: Option<&str>,
        bind_address: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = port {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "port",
                    value: port.to_string(),
                })?;
        }
        if let Some(bind_address) = bind_address {
            self.bind_address = bind_address.trim().to_string();
        }
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_sessions",
                value: "0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity",
                value: "0".to_string(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_line_length",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "bind_address",
                value: self.bind_address.clone(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Returns the event log path, or `None` if the file sink is disabled.
    pub fn log_path(&self) -> Option<&Path> {
        if self.log_file.as_os_str().is_empty() {
            None
        } else {
            Some(&self.log_file)
        }
    }
}

/// Returns `<config dir>/mathq/mathqd.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mathq").join("mathqd.toml"))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
