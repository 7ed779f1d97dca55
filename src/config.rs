//! Client configuration.

use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub format: LogFormat,
    /// Extra tracing filter directives, e.g. `quorus::socket=trace`.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            format: LogFormat::Compact,
            filter: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connect and read timeout for pooled sockets, in milliseconds.
    pub so_timeout_ms: u64,
    /// Requested SO_RCVBUF / SO_SNDBUF, in bytes.
    pub socket_buffer_size: usize,
    pub max_connections_per_destination: usize,
    /// How long a checkout blocks waiting for a pooled connection.
    pub checkout_timeout_ms: u64,
    /// How long a node stays banned after a recorded exception.
    pub bannage_ms: u64,
    /// Treat a missing creation timestamp as an invalid transport.
    pub strict_validation: bool,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            so_timeout_ms: 5_000,
            socket_buffer_size: 64 * 1024,
            max_connections_per_destination: 6,
            checkout_timeout_ms: 10_000,
            bannage_ms: 30_000,
            strict_validation: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn so_timeout(&self) -> Duration {
        Duration::from_millis(self.so_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn bannage(&self) -> Duration {
        Duration::from_millis(self.bannage_ms)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override file values. Unparseable values are
    /// warned about and ignored rather than failing startup.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("QUORUS_SO_TIMEOUT_MS", &mut self.so_timeout_ms);
        override_from_env("QUORUS_SOCKET_BUFFER_SIZE", &mut self.socket_buffer_size);
        override_from_env(
            "QUORUS_MAX_CONNECTIONS_PER_DESTINATION",
            &mut self.max_connections_per_destination,
        );
        override_from_env("QUORUS_CHECKOUT_TIMEOUT_MS", &mut self.checkout_timeout_ms);
        override_from_env("QUORUS_BANNAGE_MS", &mut self.bannage_ms);
    }
}

fn override_from_env<T: std::str::FromStr>(var: &'static str, target: &mut T) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(var, value = %raw, "ignoring unparseable env override"),
    }
}
