//! Rendering of command results as text or JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use keyrelay_core::{ClientId, ClientName, MessageType};
use keyrelay_protocol::payload::{
    DirectoryEntry, MailboxRecord, PublicKeyResponse, SendMessageResponse,
};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Serialize)]
pub struct RegisteredView<'a> {
    pub name: &'a ClientName,
    pub id: ClientId,
}

#[derive(Debug, Serialize)]
pub struct UserView<'a> {
    pub id: ClientId,
    pub name: &'a ClientName,
}

impl<'a> From<&'a DirectoryEntry> for UserView<'a> {
    fn from(entry: &'a DirectoryEntry) -> Self {
        Self {
            id: entry.id,
            name: &entry.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyView {
    pub id: ClientId,
    /// Base64 of the 160-byte key.
    pub public_key: String,
}

impl From<&PublicKeyResponse> for KeyView {
    fn from(response: &PublicKeyResponse) -> Self {
        Self {
            id: response.id,
            public_key: STANDARD.encode(response.public_key.as_bytes()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SentView {
    pub to: ClientId,
    pub message_id: u32,
    pub message_type: MessageType,
}

impl SentView {
    pub fn new(response: &SendMessageResponse, message_type: MessageType) -> Self {
        Self {
            to: response.to,
            message_id: response.message_id.get(),
            message_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub from: ClientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    pub message_id: u32,
    pub message_type: MessageType,
    /// UTF-8 text for text messages that decode cleanly, base64 otherwise.
    pub content: String,
    pub encoding: ContentEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    Utf8,
    Base64,
}

impl MessageView {
    pub fn new(record: &MailboxRecord, from_name: Option<String>) -> Self {
        let text = match record.message_type {
            MessageType::Text => std::str::from_utf8(&record.content).ok(),
            _ => None,
        };
        let (content, encoding) = match text {
            Some(text) => (text.to_string(), ContentEncoding::Utf8),
            None => (STANDARD.encode(&record.content), ContentEncoding::Base64),
        };
        Self {
            from: record.from,
            from_name,
            message_id: record.message_id.get(),
            message_type: record.message_type,
            content,
            encoding,
        }
    }

    fn render_text(&self) -> String {
        let from = match &self.from_name {
            Some(name) => format!("{} ({})", name, self.from),
            None => self.from.to_string(),
        };
        let body = match (self.message_type, self.content.is_empty()) {
            (_, true) => "(empty)".to_string(),
            (MessageType::KeyRequest, false) => format!("Public key delivered: {}", self.content),
            (MessageType::SymmetricKey, false) => format!("Symmetric key: {}", self.content),
            (MessageType::Text, false) => self.content.clone(),
            (MessageType::File, false) => format!("File contents (base64): {}", self.content),
        };
        format!(
            "From: {}\nMessage: #{} {}\nContent:\n{}\n-----<EOM>-----",
            from, self.message_id, self.message_type, body
        )
    }
}

/// Decodes a base64 argument.
pub fn decode_base64(input: &str) -> ClientResult<Vec<u8>> {
    STANDARD
        .decode(input.trim())
        .map_err(|e| ClientError::InvalidInput(format!("invalid base64: {}", e)))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> ClientResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::Protocol(format!("failed to serialize output: {}", e)))
}

pub fn render_registered(view: &RegisteredView<'_>, json: bool) -> ClientResult<String> {
    if json {
        return to_json(view);
    }
    Ok(format!("Registered {} as {}", view.name, view.id))
}

pub fn render_users(entries: &[DirectoryEntry], json: bool) -> ClientResult<String> {
    let views: Vec<UserView<'_>> = entries.iter().map(UserView::from).collect();
    if json {
        return to_json(&views);
    }
    if views.is_empty() {
        return Ok("No other clients registered".to_string());
    }
    Ok(views
        .iter()
        .map(|v| format!("{}  {}", v.id, v.name))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn render_key(view: &KeyView, json: bool) -> ClientResult<String> {
    if json {
        return to_json(view);
    }
    Ok(format!("{}  {}", view.id, view.public_key))
}

pub fn render_sent(view: &SentView, json: bool) -> ClientResult<String> {
    if json {
        return to_json(view);
    }
    Ok(format!(
        "Queued {} message #{} for {}",
        view.message_type, view.message_id, view.to
    ))
}

pub fn render_messages(views: &[MessageView], json: bool) -> ClientResult<String> {
    if json {
        return to_json(views);
    }
    if views.is_empty() {
        return Ok("No pending messages".to_string());
    }
    Ok(views
        .iter()
        .map(MessageView::render_text)
        .collect::<Vec<_>>()
        .join("\n"))
}
