//! Directory and mailbox records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{ClientId, ClientName, PublicKey};

/// Kind of content carried by a mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageType {
    /// Request for the recipient's public key.
    KeyRequest = 1,
    /// Symmetric key encrypted for the recipient.
    SymmetricKey = 2,
    /// Text message.
    Text = 3,
    /// File payload.
    File = 4,
}

impl MessageType {
    /// Returns the wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::KeyRequest),
            2 => Ok(Self::SymmetricKey),
            3 => Ok(Self::Text),
            4 => Ok(Self::File),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyRequest => "key-request",
            Self::SymmetricKey => "symmetric-key",
            Self::Text => "text",
            Self::File => "file",
        };
        f.write_str(name)
    }
}

/// Store-wide message identifier, allocated in creation order from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl MessageId {
    /// First identifier handed out by a fresh store.
    pub const FIRST: MessageId = MessageId(1);

    /// Returns the raw value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered client as held in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: ClientName,
    pub public_key: PublicKey,
    /// Registration time, refreshed on every later request from this client.
    pub last_seen: DateTime<Utc>,
}

/// A message waiting in a recipient's mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    pub id: MessageId,
    pub to: ClientId,
    pub from: ClientId,
    pub message_type: MessageType,
    pub content: Vec<u8>,
}
