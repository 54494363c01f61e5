//! TCP client for the keyrelay relay.
//!
//! Each call opens a fresh connection, sends one request frame and reads one
//! response frame. Responses are checked against the layout expected for the
//! request before being decoded.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use keyrelay_core::{ClientId, ClientName, MessageType, PublicKey};
use keyrelay_protocol::payload::{
    self, DirectoryEntry, MailboxRecord, PublicKeyResponse, RegisterRequest, SendMessageRequest,
    SendMessageResponse,
};
use keyrelay_protocol::{
    Frame, HEADER_SIZE, Header, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION, ProtocolError, RequestCode,
    ResponseCode,
};

use crate::error::{ClientError, ClientResult};

/// Largest message content the relay accepts in one SEND request.
pub const MAX_CONTENT_SIZE: usize = MAX_PAYLOAD_SIZE as usize - SendMessageRequest::PREFIX_SIZE;

/// Client for one relay address.
pub struct RelayClient {
    address: String,
    timeout: Duration,
    client_id: ClientId,
}

impl RelayClient {
    /// Creates a client that sends requests as the unregistered (zero) sender.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            client_id: ClientId::ZERO,
        }
    }

    /// Sets the sender identifier written into request headers.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Sends one request and returns the raw response frame.
    pub async fn send(&self, code: RequestCode, payload: Vec<u8>) -> ClientResult<Frame> {
        let request = Frame::request(self.client_id, PROTOCOL_VERSION, code, payload);
        let bytes = request.encode()?;

        debug!(address = %self.address, code = %code, "connecting to relay");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!("failed to connect to {}: {}", self.address, e))
            })?;

        tokio::time::timeout(self.timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ClientError::Timeout("sending request".into()))??;

        let response = tokio::time::timeout(self.timeout, read_response(&mut stream))
            .await
            .map_err(|_| ClientError::Timeout("reading response".into()))??;

        debug!(
            code = response.code,
            payload_len = response.payload.len(),
            "response received"
        );
        Ok(response)
    }

    /// Sends a request and checks the response code.
    async fn call(
        &self,
        code: RequestCode,
        payload: Vec<u8>,
        expected: ResponseCode,
    ) -> ClientResult<Vec<u8>> {
        let response = self.send(code, payload).await?;
        match response.response_code()? {
            ResponseCode::Error => Err(ClientError::Server(format!("{} rejected", code))),
            actual if actual == expected => Ok(response.payload),
            actual => Err(ClientError::Protocol(format!(
                "expected response {} to {}, got {}",
                expected.as_u16(),
                code,
                actual.as_u16()
            ))),
        }
    }

    /// Registers a name and key, returning the assigned identifier.
    pub async fn register(
        &self,
        name: ClientName,
        public_key: PublicKey,
    ) -> ClientResult<ClientId> {
        let payload = RegisterRequest { name, public_key }.encode();
        let body = self
            .call(RequestCode::Register, payload, ResponseCode::Registered)
            .await?;
        expect_len(&body, keyrelay_core::CLIENT_ID_SIZE, "registration")?;
        Ok(ClientId::from_slice(&body)?)
    }

    /// Lists every registered client except the sender.
    pub async fn list_users(&self) -> ClientResult<Vec<DirectoryEntry>> {
        let body = self
            .call(RequestCode::ListUsers, Vec::new(), ResponseCode::UserList)
            .await?;
        if body.len() % DirectoryEntry::SIZE != 0 {
            return Err(ClientError::Protocol(format!(
                "directory payload of {} bytes is not a multiple of {}",
                body.len(),
                DirectoryEntry::SIZE
            )));
        }
        Ok(payload::decode_directory(&body)?)
    }

    /// Fetches a client's public key.
    pub async fn get_public_key(&self, target: ClientId) -> ClientResult<PublicKeyResponse> {
        let body = self
            .call(
                RequestCode::GetPublicKey,
                target.as_bytes().to_vec(),
                ResponseCode::PublicKey,
            )
            .await?;
        expect_len(&body, PublicKeyResponse::SIZE, "public key")?;
        Ok(PublicKeyResponse::decode(&body)?)
    }

    /// Queues a message for `to`.
    pub async fn send_message(
        &self,
        to: ClientId,
        message_type: MessageType,
        content: Vec<u8>,
    ) -> ClientResult<SendMessageResponse> {
        check_content_len(content.len())?;
        let payload = SendMessageRequest {
            to,
            message_type,
            content,
        }
        .encode()?;
        let body = self
            .call(RequestCode::SendMessage, payload, ResponseCode::MessageStored)
            .await?;
        expect_len(&body, SendMessageResponse::SIZE, "send confirmation")?;
        Ok(SendMessageResponse::decode(&body)?)
    }

    /// Drains the sender's mailbox.
    pub async fn fetch_messages(&self) -> ClientResult<Vec<MailboxRecord>> {
        let body = self
            .call(RequestCode::FetchMessages, Vec::new(), ResponseCode::Messages)
            .await?;
        Ok(payload::decode_mailbox(&body)?)
    }
}

/// Reads one response frame.
///
/// Mailbox responses have no fixed bound, so the body buffer grows with the
/// bytes that arrive instead of being sized from the declared length.
async fn read_response(stream: &mut TcpStream) -> ClientResult<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).await?;
    let header = Header::decode(&header);
    if header.version != PROTOCOL_VERSION {
        return Err(ClientError::Protocol(format!(
            "relay answered with protocol version {}, expected {}",
            header.version, PROTOCOL_VERSION
        )));
    }

    let expected = header.payload_len as usize;
    let mut body = Vec::new();
    (&mut *stream)
        .take(u64::from(header.payload_len))
        .read_to_end(&mut body)
        .await?;
    if body.len() < expected {
        return Err(ProtocolError::Incomplete {
            expected,
            received: body.len(),
        }
        .into());
    }
    Ok(Frame::from_parts(header, body))
}

/// Rejects message content too large for a single request.
pub fn check_content_len(len: usize) -> ClientResult<()> {
    if len > MAX_CONTENT_SIZE {
        return Err(ClientError::InvalidInput(format!(
            "message content is {} bytes, the relay accepts at most {}",
            len, MAX_CONTENT_SIZE
        )));
    }
    Ok(())
}

fn expect_len(body: &[u8], expected: usize, what: &str) -> ClientResult<()> {
    if body.len() != expected {
        return Err(ClientError::Protocol(format!(
            "{} payload is {} bytes, expected {}",
            what,
            body.len(),
            expected
        )));
    }
    Ok(())
}
