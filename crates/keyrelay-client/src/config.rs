//! Client configuration.
//!
//! All settings live in `~/.config/keyrelay/config.toml` by default:
//!
//! ```toml
//! [server]
//! address = "127.0.0.1:1357"
//! timeout = 5
//!
//! [identity]
//! path = "/home/me/.local/share/keyrelay/me.info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use keyrelay_server::DEFAULT_PORT;

/// Name of the identity file written by `keyrelay register`.
pub const IDENTITY_FILE_NAME: &str = "me.info";

/// Configuration for the keyrelay client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay connection settings.
    pub server: ServerSettings,

    /// Where the registered identity is kept.
    pub identity: IdentitySettings,
}

/// Relay connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// `host:port` of the relay.
    pub address: String,

    /// Connect and I/O timeout in seconds.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", DEFAULT_PORT),
            timeout: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Identity file; defaults to `me.info` in the data directory.
    pub path: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if absent.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyrelay")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyrelay")
    }

    /// Resolved identity file path.
    pub fn identity_path(&self) -> PathBuf {
        self.identity
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(IDENTITY_FILE_NAME))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout)
    }
}
