//! One-shot relay commands: register, directory, keys, send and fetch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use keyrelay_core::{ClientId, ClientName, MessageType, PUBLIC_KEY_SIZE, PublicKey};

use crate::error::{ClientError, ClientResult};
use crate::identity::Identity;
use crate::output::{self, KeyView, MessageView, RegisteredView, SentView};
use crate::socket::{MAX_CONTENT_SIZE, RelayClient};

/// Settings shared by every relay command.
#[derive(Debug, Clone)]
pub struct Session {
    pub address: String,
    pub timeout: Duration,
    pub identity_path: PathBuf,
    pub json: bool,
}

impl Session {
    fn anonymous(&self) -> RelayClient {
        RelayClient::new(self.address.clone(), self.timeout)
    }

    /// Client that sends as the identity stored on disk.
    fn registered(&self) -> ClientResult<(Identity, RelayClient)> {
        let identity = Identity::load(&self.identity_path)?;
        let client = self.anonymous().with_client_id(identity.id);
        Ok((identity, client))
    }
}

/// Registers `name` and saves the identity file.
pub async fn register(
    session: &Session,
    name: &str,
    public_key_file: Option<&Path>,
) -> ClientResult<String> {
    if session.identity_path.exists() {
        return Err(ClientError::Identity(format!(
            "{} already exists; remove it to register again",
            session.identity_path.display()
        )));
    }

    let name = ClientName::new(name)?;
    let public_key = match public_key_file {
        Some(path) => read_public_key(path)?,
        None => {
            warn!("No public key file given, registering an all-zero key");
            PublicKey::default()
        }
    };

    let id = session.anonymous().register(name.clone(), public_key).await?;
    let identity = Identity::new(name, id);
    identity.save(&session.identity_path)?;
    debug!(path = %session.identity_path.display(), "Identity saved");

    output::render_registered(
        &RegisteredView {
            name: &identity.name,
            id: identity.id,
        },
        session.json,
    )
}

fn read_public_key(path: &Path) -> ClientResult<PublicKey> {
    let bytes = std::fs::read(path)?;
    PublicKey::from_slice(&bytes).map_err(|_| {
        ClientError::InvalidInput(format!(
            "{} holds {} bytes, a public key is exactly {}",
            path.display(),
            bytes.len(),
            PUBLIC_KEY_SIZE
        ))
    })
}

/// Lists the other registered clients.
pub async fn users(session: &Session) -> ClientResult<String> {
    // Listing works before registration too; the zero sender excludes nobody.
    let client = if session.identity_path.exists() {
        let identity = Identity::load(&session.identity_path)?;
        session.anonymous().with_client_id(identity.id)
    } else {
        session.anonymous()
    };
    let entries = client.list_users().await?;
    output::render_users(&entries, session.json)
}

pub async fn get_key(session: &Session, target: ClientId) -> ClientResult<String> {
    let response = session.anonymous().get_public_key(target).await?;
    output::render_key(&KeyView::from(&response), session.json)
}

pub async fn request_key(session: &Session, target: ClientId) -> ClientResult<String> {
    send(session, target, MessageType::KeyRequest, Vec::new()).await
}

pub async fn send_key(
    session: &Session,
    target: ClientId,
    key_base64: &str,
) -> ClientResult<String> {
    let key = output::decode_base64(key_base64)?;
    send(session, target, MessageType::SymmetricKey, key).await
}

pub async fn send_text(session: &Session, target: ClientId, text: &str) -> ClientResult<String> {
    send(session, target, MessageType::Text, text.as_bytes().to_vec()).await
}

pub async fn send_file(session: &Session, target: ClientId, path: &Path) -> ClientResult<String> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_CONTENT_SIZE as u64 {
        return Err(ClientError::InvalidInput(format!(
            "{} is {} bytes, the relay accepts at most {}",
            path.display(),
            size,
            MAX_CONTENT_SIZE
        )));
    }
    let content = std::fs::read(path)?;
    debug!(path = %path.display(), bytes = content.len(), "Sending file");
    send(session, target, MessageType::File, content).await
}

async fn send(
    session: &Session,
    target: ClientId,
    message_type: MessageType,
    content: Vec<u8>,
) -> ClientResult<String> {
    let (_, client) = session.registered()?;
    let response = client.send_message(target, message_type, content).await?;
    output::render_sent(&SentView::new(&response, message_type), session.json)
}

/// Drains the mailbox and renders every message, resolving sender names
/// from the directory when it can be fetched.
pub async fn fetch(session: &Session) -> ClientResult<String> {
    let (_, client) = session.registered()?;
    let records = client.fetch_messages().await?;

    let names: HashMap<ClientId, String> = if records.is_empty() {
        HashMap::new()
    } else {
        match client.list_users().await {
            Ok(entries) => entries
                .into_iter()
                .map(|e| (e.id, e.name.as_str().to_string()))
                .collect(),
            Err(e) => {
                debug!(error = %e, "Could not resolve sender names");
                HashMap::new()
            }
        }
    };

    let views: Vec<MessageView> = records
        .iter()
        .map(|r| MessageView::new(r, names.get(&r.from).cloned()))
        .collect();
    output::render_messages(&views, session.json)
}
