//! Client identity value types.
//!
//! Every registered client is named by a [`ClientId`], carries an ASCII
//! [`ClientName`] and an opaque [`PublicKey`] blob. None of these are
//! interpreted cryptographically by the relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Size of a client identifier on the wire.
pub const CLIENT_ID_SIZE: usize = 16;

/// Size of the NUL-padded name field on the wire.
pub const NAME_FIELD_SIZE: usize = 255;

/// Longest name that still leaves room for the terminating NUL.
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;

/// Size of a public key blob on the wire.
pub const PUBLIC_KEY_SIZE: usize = 160;

/// Errors raised while building identity values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Identifier text is not 32 hex digits (or a hyphenated UUID).
    #[error("invalid client id: {0}")]
    InvalidId(String),

    /// Byte slice has the wrong length for a fixed-size field.
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    /// Name is longer than the wire field allows.
    #[error("name too long: {len} bytes (max: {MAX_NAME_LEN})")]
    NameTooLong { len: usize },

    /// Name contains a non-ASCII byte or an interior NUL.
    #[error("name must be ASCII without NUL bytes")]
    NameNotAscii,
}

/// 16-byte opaque client identifier.
///
/// The all-zero value is what an unregistered client sends and what the
/// server puts in every response header.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// The all-zero identifier.
    pub const ZERO: ClientId = ClientId([0u8; CLIENT_ID_SIZE]);

    /// Generates a fresh random identifier (128-bit v4 UUID bytes).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Wraps raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds an identifier from a slice that must be exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; CLIENT_ID_SIZE] =
            bytes.try_into().map_err(|_| IdentityError::Length {
                expected: CLIENT_ID_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }

    /// Returns true for the all-zero identifier.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CLIENT_ID_SIZE]
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).simple())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self)
    }
}

impl FromStr for ClientId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s.trim())
            .map(|uuid| Self(uuid.into_bytes()))
            .map_err(|_| IdentityError::InvalidId(s.to_string()))
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// ASCII display name, at most 254 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientName(String);

impl ClientName {
    /// Validates and wraps a display name.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if !name.bytes().all(|b| b.is_ascii() && b != 0) {
            return Err(IdentityError::NameNotAscii);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(IdentityError::NameTooLong { len: name.len() });
        }
        Ok(Self(name))
    }

    /// Decodes a NUL-padded name field.
    ///
    /// Only the bytes before the first NUL are kept; a field without any NUL
    /// is taken whole, truncated to [`MAX_NAME_LEN`].
    pub fn from_field(field: &[u8]) -> Result<Self, IdentityError> {
        let end = field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(field.len())
            .min(MAX_NAME_LEN);
        let raw = &field[..end];
        if !raw.is_ascii() {
            return Err(IdentityError::NameNotAscii);
        }
        // ASCII is always valid UTF-8.
        Ok(Self(String::from_utf8_lossy(raw).into_owned()))
    }

    /// Encodes into a 255-byte NUL-padded field.
    pub fn to_field(&self) -> [u8; NAME_FIELD_SIZE] {
        let mut field = [0u8; NAME_FIELD_SIZE];
        field[..self.0.len()].copy_from_slice(self.0.as_bytes());
        field
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientName {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientName> for String {
    fn from(name: ClientName) -> Self {
        name.0
    }
}

/// Fixed 160-byte public key blob.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Wraps raw key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice that must be exactly 160 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| IdentityError::Length {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        Self([0u8; PUBLIC_KEY_SIZE])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PublicKey({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_not_zero() {
        let id = ClientId::generate();
        assert!(!id.is_zero());
        assert_ne!(id, ClientId::generate());
    }

    #[test]
    fn id_display_is_plain_hex() {
        let id = ClientId::from_bytes([0xab; 16]);
        assert_eq!(id.to_string(), "ab".repeat(16));
    }

    #[test]
    fn id_parses_simple_and_hyphenated() {
        let id = ClientId::generate();
        let simple: ClientId = id.to_string().parse().unwrap();
        assert_eq!(simple, id);

        let hyphenated = Uuid::from_bytes(*id.as_bytes()).hyphenated().to_string();
        assert_eq!(hyphenated.parse::<ClientId>().unwrap(), id);
    }

    #[test]
    fn id_parse_rejects_garbage() {
        assert!(matches!(
            "not-an-id".parse::<ClientId>(),
            Err(IdentityError::InvalidId(_))
        ));
    }

    #[test]
    fn id_from_slice_checks_length() {
        assert_eq!(
            ClientId::from_slice(&[1, 2, 3]),
            Err(IdentityError::Length {
                expected: 16,
                actual: 3
            })
        );
    }

    #[test]
    fn id_serializes_as_hex_string() {
        let id = ClientId::from_bytes([0x01; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(16)));
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn name_field_roundtrip() {
        let name = ClientName::new("Alice").unwrap();
        let field = name.to_field();
        assert_eq!(&field[..5], b"Alice");
        assert!(field[5..].iter().all(|&b| b == 0));
        assert_eq!(ClientName::from_field(&field).unwrap(), name);
    }

    #[test]
    fn name_rejects_non_ascii_and_long() {
        assert_eq!(ClientName::new("Zoë"), Err(IdentityError::NameNotAscii));
        assert_eq!(
            ClientName::new("x".repeat(255)),
            Err(IdentityError::NameTooLong { len: 255 })
        );
        assert!(ClientName::new("x".repeat(254)).is_ok());
    }

    #[test]
    fn name_from_unterminated_field_is_truncated() {
        let field = [b'a'; NAME_FIELD_SIZE];
        let name = ClientName::from_field(&field).unwrap();
        assert_eq!(name.as_str().len(), MAX_NAME_LEN);
    }

    #[test]
    fn public_key_from_slice() {
        assert!(PublicKey::from_slice(&[7u8; PUBLIC_KEY_SIZE]).is_ok());
        assert!(PublicKey::from_slice(&[7u8; 159]).is_err());
    }
}
