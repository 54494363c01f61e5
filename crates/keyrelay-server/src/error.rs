//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
///
/// Only `Bind` and `Config` are fatal to the process; the others end a single
/// connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error on a connection.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing error on a connection.
    #[error("Protocol error: {0}")]
    Protocol(#[from] keyrelay_protocol::ProtocolError),

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Peer stayed idle past the configured read timeout.
    #[error("Read timed out for {peer}")]
    Timeout { peer: SocketAddr },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bind error.
    pub fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}
