//! Client error types.

use std::fmt;

use keyrelay_core::IdentityError;
use keyrelay_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to the relay failed.
    Connection(String),
    /// Framing or payload layout error.
    Protocol(String),
    /// Request timed out.
    Timeout(String),
    /// The relay answered with the generic error code.
    Server(String),
    /// Identity file missing or unreadable.
    Identity(String),
    /// Bad command-line input.
    InvalidInput(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Server(msg) => write!(f, "server responded with an error: {}", msg),
            Self::Identity(msg) => write!(f, "identity error: {}", msg),
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<IdentityError> for ClientError {
    fn from(err: IdentityError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
