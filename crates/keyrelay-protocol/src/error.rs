//! Protocol error types.

use keyrelay_core::IdentityError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing or parsing messages.
///
/// `Io`, `Incomplete` and `PayloadTooLarge` are framing failures that end a
/// connection. The rest are recoverable parse failures of one request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream or buffer ended before a complete frame was received.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    Incomplete { expected: usize, received: usize },

    /// Declared payload length exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u32, max: u32 },

    /// Payload is too short for the fields it must contain.
    #[error("malformed {what} payload: need {needed} bytes, got {actual}")]
    Malformed {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    /// Request code outside the known set.
    #[error("unknown request code: {0}")]
    UnknownRequestCode(u16),

    /// Response code outside the known set.
    #[error("unknown response code: {0}")]
    UnknownResponseCode(u16),

    /// Message sub-type outside 1..=4.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Name or key field failed validation.
    #[error("invalid field: {0}")]
    InvalidField(#[from] IdentityError),
}

impl ProtocolError {
    pub(crate) fn malformed(what: &'static str, needed: usize, actual: usize) -> Self {
        Self::Malformed {
            what,
            needed,
            actual,
        }
    }

    /// Returns true if the error leaves the byte stream unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Incomplete { .. } | Self::PayloadTooLarge { .. }
        )
    }
}
