//! Typed payload layouts for each request and response.
//!
//! | Code | Layout |
//! |------|--------|
//! | 600  | name[255] + public_key[160] |
//! | 602  | target id[16] |
//! | 603  | to[16] + msg_type[1] + content_len[4] + content |
//! | 2100 | new id[16] |
//! | 2101 | (id[16] + name[255])* |
//! | 2102 | id[16] + public_key[160] |
//! | 2103 | to[16] + message_id[4] |
//! | 2104 | (from[16] + message_id[4] + msg_type[1] + content_len[4] + content)* |
//!
//! Request decoders ignore trailing bytes after a fixed-size layout; they
//! only fail when a field is missing.

use keyrelay_core::{
    CLIENT_ID_SIZE, ClientId, ClientName, MessageId, MessageType, NAME_FIELD_SIZE,
    PUBLIC_KEY_SIZE, PublicKey,
};

use crate::error::{ProtocolError, ProtocolResult};

/// Bounds-checked sequential reader over a payload.
struct Fields<'a> {
    what: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(what: &'static str, buf: &'a [u8]) -> Self {
        Self { what, buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let buf = self.buf;
        let end = self.pos + n;
        let slice = buf
            .get(self.pos..end)
            .ok_or_else(|| ProtocolError::malformed(self.what, end, self.buf.len()))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> ProtocolResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn client_id(&mut self) -> ProtocolResult<ClientId> {
        Ok(ClientId::from_slice(self.take(CLIENT_ID_SIZE)?)?)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn message_type(raw: u8) -> ProtocolResult<MessageType> {
    MessageType::try_from(raw).map_err(ProtocolError::UnknownMessageType)
}

fn content_len(content: &[u8]) -> ProtocolResult<u32> {
    u32::try_from(content.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })
}

/// REGISTER (600) request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub name: ClientName,
    pub public_key: PublicKey,
}

impl RegisterRequest {
    /// Encoded size: name field plus key.
    pub const SIZE: usize = NAME_FIELD_SIZE + PUBLIC_KEY_SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.name.to_field());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut fields = Fields::new("register", payload);
        let name = ClientName::from_field(fields.take(NAME_FIELD_SIZE)?)?;
        let public_key = PublicKey::from_slice(fields.take(PUBLIC_KEY_SIZE)?)?;
        Ok(Self { name, public_key })
    }
}

/// GET_PUBLIC_KEY (602) request payload: the target identifier.
pub fn decode_target(payload: &[u8]) -> ProtocolResult<ClientId> {
    Fields::new("get public key", payload).client_id()
}

/// SEND_MESSAGE (603) request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub to: ClientId,
    pub message_type: MessageType,
    pub content: Vec<u8>,
}

impl SendMessageRequest {
    /// Size of the fixed part before the content.
    pub const PREFIX_SIZE: usize = CLIENT_ID_SIZE + 1 + 4;

    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let len = content_len(&self.content)?;
        let mut buf = Vec::with_capacity(Self::PREFIX_SIZE + self.content.len());
        buf.extend_from_slice(self.to.as_bytes());
        buf.push(self.message_type.as_u8());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.content);
        Ok(buf)
    }

    /// Decodes the payload. The declared content length must be fully
    /// present; an unknown sub-type is [`ProtocolError::UnknownMessageType`].
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut fields = Fields::new("send message", payload);
        let to = fields.client_id()?;
        let raw_type = fields.u8()?;
        let len = fields.u32()? as usize;
        let content = fields.take(len)?.to_vec();
        Ok(Self {
            to,
            message_type: message_type(raw_type)?,
            content,
        })
    }
}

/// One entry of a LIST_USERS (2101) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: ClientId,
    pub name: ClientName,
}

impl DirectoryEntry {
    pub const SIZE: usize = CLIENT_ID_SIZE + NAME_FIELD_SIZE;
}

/// Encodes a LIST_USERS response payload.
pub fn encode_directory(entries: &[DirectoryEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * DirectoryEntry::SIZE);
    for entry in entries {
        buf.extend_from_slice(entry.id.as_bytes());
        buf.extend_from_slice(&entry.name.to_field());
    }
    buf
}

/// Decodes a LIST_USERS response payload, which must be a whole number of
/// entries.
pub fn decode_directory(payload: &[u8]) -> ProtocolResult<Vec<DirectoryEntry>> {
    if payload.len() % DirectoryEntry::SIZE != 0 {
        let needed = (payload.len() / DirectoryEntry::SIZE + 1) * DirectoryEntry::SIZE;
        return Err(ProtocolError::malformed("user list", needed, payload.len()));
    }
    payload
        .chunks_exact(DirectoryEntry::SIZE)
        .map(|chunk| {
            let mut fields = Fields::new("user list", chunk);
            let id = fields.client_id()?;
            let name = ClientName::from_field(fields.take(NAME_FIELD_SIZE)?)?;
            Ok(DirectoryEntry { id, name })
        })
        .collect()
}

/// GET_PUBLIC_KEY (2102) response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyResponse {
    pub id: ClientId,
    pub public_key: PublicKey,
}

impl PublicKeyResponse {
    pub const SIZE: usize = CLIENT_ID_SIZE + PUBLIC_KEY_SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut fields = Fields::new("public key", payload);
        let id = fields.client_id()?;
        let public_key = PublicKey::from_slice(fields.take(PUBLIC_KEY_SIZE)?)?;
        Ok(Self { id, public_key })
    }
}

/// SEND_MESSAGE (2103) response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendMessageResponse {
    pub to: ClientId,
    pub message_id: MessageId,
}

impl SendMessageResponse {
    pub const SIZE: usize = CLIENT_ID_SIZE + 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&self.message_id.get().to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        let mut fields = Fields::new("message stored", payload);
        let to = fields.client_id()?;
        let message_id = MessageId(fields.u32()?);
        Ok(Self { to, message_id })
    }
}

/// One entry of a FETCH_MESSAGES (2104) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRecord {
    pub from: ClientId,
    pub message_id: MessageId,
    pub message_type: MessageType,
    pub content: Vec<u8>,
}

/// Encodes a FETCH_MESSAGES response payload.
pub fn encode_mailbox(records: &[MailboxRecord]) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    for record in records {
        let len = content_len(&record.content)?;
        buf.extend_from_slice(record.from.as_bytes());
        buf.extend_from_slice(&record.message_id.get().to_le_bytes());
        buf.push(record.message_type.as_u8());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&record.content);
    }
    Ok(buf)
}

/// Decodes a FETCH_MESSAGES response payload.
pub fn decode_mailbox(payload: &[u8]) -> ProtocolResult<Vec<MailboxRecord>> {
    let mut fields = Fields::new("messages", payload);
    let mut records = Vec::new();
    while !fields.is_empty() {
        let from = fields.client_id()?;
        let message_id = MessageId(fields.u32()?);
        let message_type = message_type(fields.u8()?)?;
        let len = fields.u32()? as usize;
        let content = fields.take(len)?.to_vec();
        records.push(MailboxRecord {
            from,
            message_id,
            message_type,
            content,
        });
    }
    Ok(records)
}
