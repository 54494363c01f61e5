//! Binary wire protocol for the keyrelay store-and-forward relay.
//!
//! # Frame layout
//!
//! Every request and response is a 23-byte header followed by an opaque
//! payload:
//!
//! - 16 bytes: sender client id (all zero in responses)
//! - 1 byte: protocol version
//! - 2 bytes: request or response code (u16, little-endian)
//! - 4 bytes: payload length (u32, little-endian)
//!
//! The [`payload`] module gives the per-code payload layouts.
//!
//! # Example
//!
//! ```rust
//! use keyrelay_core::ClientId;
//! use keyrelay_protocol::{Frame, RequestCode, PROTOCOL_VERSION};
//!
//! let frame = Frame::request(ClientId::ZERO, PROTOCOL_VERSION, RequestCode::ListUsers, vec![]);
//! let bytes = frame.encode().unwrap();
//! assert_eq!(Frame::decode(&bytes).unwrap(), frame);
//! ```

mod error;
mod framing;
mod header;
pub mod payload;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{Frame, FrameReader, FrameWriter, check_declared_len};
pub use header::{HEADER_SIZE, Header, RequestCode, ResponseCode};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest payload a peer may declare (64 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;
