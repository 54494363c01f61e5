//! Fixed 23-byte frame header and the request/response code tables.
//!
//! ```text
//! +-------------------+---------+-----------+------------------+
//! | client id (16)    | ver (1) | code (2)  | payload len (4)  |
//! +-------------------+---------+-----------+------------------+
//! ```
//!
//! All integers are little-endian. Responses carry an all-zero client id.

use std::fmt;

use keyrelay_core::{CLIENT_ID_SIZE, ClientId};

use crate::error::ProtocolError;

/// Size of the encoded header.
pub const HEADER_SIZE: usize = CLIENT_ID_SIZE + 1 + 2 + 4;

/// Request codes understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestCode {
    Register = 600,
    ListUsers = 601,
    GetPublicKey = 602,
    SendMessage = 603,
    FetchMessages = 604,
}

impl RequestCode {
    /// Returns the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for RequestCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            600 => Ok(Self::Register),
            601 => Ok(Self::ListUsers),
            602 => Ok(Self::GetPublicKey),
            603 => Ok(Self::SendMessage),
            604 => Ok(Self::FetchMessages),
            other => Err(ProtocolError::UnknownRequestCode(other)),
        }
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Register => "REGISTER",
            Self::ListUsers => "LIST_USERS",
            Self::GetPublicKey => "GET_PUBLIC_KEY",
            Self::SendMessage => "SEND_MESSAGE",
            Self::FetchMessages => "FETCH_MESSAGES",
        };
        write!(f, "{name}({})", self.as_u16())
    }
}

/// Response codes sent by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    Registered = 2100,
    UserList = 2101,
    PublicKey = 2102,
    MessageStored = 2103,
    Messages = 2104,
    /// Generic failure, always with an empty payload.
    Error = 9000,
}

impl ResponseCode {
    /// Returns the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            2100 => Ok(Self::Registered),
            2101 => Ok(Self::UserList),
            2102 => Ok(Self::PublicKey),
            2103 => Ok(Self::MessageStored),
            2104 => Ok(Self::Messages),
            9000 => Ok(Self::Error),
            other => Err(ProtocolError::UnknownResponseCode(other)),
        }
    }
}

/// Decoded frame header.
///
/// `code` stays a raw `u16` so that unknown request codes survive decoding and
/// can be answered by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_len: u32,
}

impl Header {
    /// Encodes the header into its fixed wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..16].copy_from_slice(self.client_id.as_bytes());
        buf[16] = self.version;
        buf[17..19].copy_from_slice(&self.code.to_le_bytes());
        buf[19..23].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decodes a header from its fixed wire form. Never fails: every bit
    /// pattern is a syntactically valid header.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut id = [0u8; CLIENT_ID_SIZE];
        id.copy_from_slice(&buf[..16]);
        Self {
            client_id: ClientId::from_bytes(id),
            version: buf[16],
            code: u16::from_le_bytes([buf[17], buf[18]]),
            payload_len: u32::from_le_bytes([buf[19], buf[20], buf[21], buf[22]]),
        }
    }

    /// Interprets `code` as a request code.
    pub fn request_code(&self) -> Result<RequestCode, ProtocolError> {
        RequestCode::try_from(self.code)
    }

    /// Interprets `code` as a response code.
    pub fn response_code(&self) -> Result<ResponseCode, ProtocolError> {
        ResponseCode::try_from(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn header_size_is_23() {
        assert_eq!(HEADER_SIZE, 23);
    }

    #[test]
    fn header_layout_is_little_endian() {
        let header = Header {
            client_id: ClientId::from_bytes([0x11; 16]),
            version: 1,
            code: 603,
            payload_len: 0x0102_0304,
        };
        insta::assert_snapshot!(
            hex(&header.encode()),
            @"11111111111111111111111111111111015b0204030201"
        );
    }

    #[test]
    fn header_decode_inverts_encode() {
        let header = Header {
            client_id: ClientId::generate(),
            version: 7,
            code: 999,
            payload_len: 42,
        };
        assert_eq!(Header::decode(&header.encode()), header);
    }

    #[test]
    fn request_codes() {
        assert_eq!(RequestCode::try_from(600).unwrap(), RequestCode::Register);
        assert_eq!(RequestCode::try_from(604).unwrap(), RequestCode::FetchMessages);
        assert!(matches!(
            RequestCode::try_from(999),
            Err(ProtocolError::UnknownRequestCode(999))
        ));
        assert_eq!(RequestCode::SendMessage.to_string(), "SEND_MESSAGE(603)");
    }

    #[test]
    fn response_codes() {
        assert_eq!(ResponseCode::try_from(9000).unwrap(), ResponseCode::Error);
        assert_eq!(ResponseCode::MessageStored.as_u16(), 2103);
        assert!(matches!(
            ResponseCode::try_from(2105),
            Err(ProtocolError::UnknownResponseCode(2105))
        ));
    }
}
