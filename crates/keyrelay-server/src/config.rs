//! Server configuration.
//!
//! Settings come from an optional TOML file:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 1357
//! version = 1
//! read_timeout_secs = 300
//! max_payload_bytes = 67108864
//! ```
//!
//! Deployments that predate the TOML file keep the port in a one-line
//! `myport.info` file, read by [`ServerConfig::port_from_file`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use keyrelay_protocol::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

use crate::error::{ServerError, ServerResult};

/// Port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 1357;

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Name of the legacy port file.
pub const PORT_FILE_NAME: &str = "myport.info";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// TCP port to bind; 0 picks an ephemeral port.
    pub port: u16,

    /// Version byte written into error responses for frames that could not be
    /// attributed to a request version.
    pub version: u8,

    /// Idle read timeout per connection. `None` waits forever.
    pub read_timeout: Option<Duration>,

    /// Largest request payload buffered; larger frames are drained and
    /// answered with an error response.
    pub max_payload: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            version: PROTOCOL_VERSION,
            read_timeout: None,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

/// On-disk shape of the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    version: Option<u8>,
    read_timeout_secs: Option<u64>,
    max_payload_bytes: Option<u32>,
}

impl ServerConfig {
    /// Creates a configuration for the given address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Loads configuration from a TOML file, filling gaps with defaults.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))?;

        let defaults = Self::default();
        Ok(Self {
            host: file.host.unwrap_or(defaults.host),
            port: file.port.unwrap_or(defaults.port),
            version: file.version.unwrap_or(defaults.version),
            read_timeout: file
                .read_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_payload: file.max_payload_bytes.unwrap_or(defaults.max_payload),
        })
    }

    /// Reads the port from a legacy one-line port file.
    ///
    /// A missing or unparsable file is not an error: it is logged and
    /// [`DEFAULT_PORT`] is used instead.
    pub fn port_from_file(path: &Path) -> u16 {
        match std::fs::read_to_string(path) {
            Ok(content) => match content.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    warn!(
                        path = %path.display(),
                        default = DEFAULT_PORT,
                        "Invalid port value in port file, using default"
                    );
                    DEFAULT_PORT
                }
            },
            Err(_) => {
                warn!(
                    path = %path.display(),
                    default = DEFAULT_PORT,
                    "Port file not found, using default port"
                );
                DEFAULT_PORT
            }
        }
    }

    /// Returns the `host:port` string to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builder: set host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Builder: set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Builder: set read timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Builder: set the largest buffered request payload.
    pub fn with_max_payload(mut self, max: u32) -> Self {
        self.max_payload = max;
        self
    }
}
