//! Request dispatch.
//!
//! Each frame goes RECEIVE -> LOOKUP -> EXECUTE -> RESPOND. Lookup is a static
//! match from request code to a [`Request`] variant; an unknown code, a
//! malformed payload or an unknown message sub-type skips straight to a 9000
//! response. Nothing a peer sends can turn into a connection error here: only
//! framing failures in [`Connection`] end a connection.

use std::future::Future;
use std::pin::Pin;

use tracing::{Span, debug, warn};

use keyrelay_core::{ClientId, MessageType};
use keyrelay_protocol::payload::{
    self, DirectoryEntry, MailboxRecord, PublicKeyResponse, RegisterRequest, SendMessageRequest,
    SendMessageResponse,
};
use keyrelay_protocol::{Frame, ProtocolError, ProtocolResult, RequestCode, ResponseCode};

use crate::error::ServerResult;
use crate::socket::{Connection, Inbound};
use crate::store::SharedStore;

/// A parsed request, one variant per request code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register(RegisterRequest),
    ListUsers,
    GetPublicKey { target: ClientId },
    SendMessage(SendMessageRequest),
    FetchMessages,
}

impl Request {
    /// Resolves a raw code and payload into a request.
    pub fn parse(code: u16, payload: &[u8]) -> ProtocolResult<Self> {
        Ok(match RequestCode::try_from(code)? {
            RequestCode::Register => Self::Register(RegisterRequest::decode(payload)?),
            RequestCode::ListUsers => Self::ListUsers,
            RequestCode::GetPublicKey => Self::GetPublicKey {
                target: payload::decode_target(payload)?,
            },
            RequestCode::SendMessage => Self::SendMessage(SendMessageRequest::decode(payload)?),
            RequestCode::FetchMessages => Self::FetchMessages,
        })
    }

    /// Returns the request code of this variant.
    pub fn code(&self) -> RequestCode {
        match self {
            Self::Register(_) => RequestCode::Register,
            Self::ListUsers => RequestCode::ListUsers,
            Self::GetPublicKey { .. } => RequestCode::GetPublicKey,
            Self::SendMessage(_) => RequestCode::SendMessage,
            Self::FetchMessages => RequestCode::FetchMessages,
        }
    }
}

/// Per-request context taken from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Sender as claimed by the header; all zero before registration.
    pub client_id: ClientId,
    /// Version echoed back in the response.
    pub version: u8,
}

impl From<&Frame> for RequestContext {
    fn from(frame: &Frame) -> Self {
        Self {
            client_id: frame.client_id,
            version: frame.version,
        }
    }
}

/// Dispatches requests against the shared store.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    store: SharedStore,
    /// Version byte for responses to frames that never reached a handler.
    server_version: u8,
}

impl RequestHandler {
    /// Creates a new request handler over `store`.
    pub fn new(store: SharedStore, server_version: u8) -> Self {
        Self {
            store,
            server_version,
        }
    }

    /// Handles one request frame and returns the response frame.
    #[tracing::instrument(
        skip(self, frame),
        fields(code = frame.code, client_id = %frame.client_id, response_code, duration_ms)
    )]
    pub fn handle(&self, frame: &Frame) -> Frame {
        let start = std::time::Instant::now();
        let ctx = RequestContext::from(frame);

        let response = match Request::parse(frame.code, &frame.payload) {
            Ok(request) => {
                let code = request.code();
                let response = self.execute(&ctx, request);
                if code != RequestCode::Register {
                    self.store.touch(&ctx.client_id);
                }
                response
            }
            Err(e) => {
                self.log_rejection(&ctx, frame, &e);
                Frame::error(self.server_version)
            }
        };

        let span = Span::current();
        span.record("response_code", response.code);
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        response
    }

    fn log_rejection(&self, ctx: &RequestContext, frame: &Frame, error: &ProtocolError) {
        match error {
            ProtocolError::UnknownRequestCode(code) => {
                warn!(code, client_id = %ctx.client_id, "Unknown request code, sending error 9000");
            }
            _ => {
                warn!(
                    code = frame.code,
                    payload_len = frame.payload.len(),
                    error = %error,
                    "Rejected request payload, sending error 9000"
                );
            }
        }
    }

    /// Runs a parsed request.
    fn execute(&self, ctx: &RequestContext, request: Request) -> Frame {
        match request {
            Request::Register(req) => {
                debug!(name = %req.name, "Handling Register request");
                let id = self.store.register(req.name, req.public_key);
                Frame::response(ctx.version, ResponseCode::Registered, id.as_bytes().to_vec())
            }
            Request::ListUsers => {
                debug!("Handling ListUsers request");
                let entries: Vec<DirectoryEntry> = self
                    .store
                    .list_all()
                    .into_iter()
                    .filter(|record| record.id != ctx.client_id)
                    .map(|record| DirectoryEntry {
                        id: record.id,
                        name: record.name,
                    })
                    .collect();
                debug!(count = entries.len(), "Returning directory");
                Frame::response(
                    ctx.version,
                    ResponseCode::UserList,
                    payload::encode_directory(&entries),
                )
            }
            Request::GetPublicKey { target } => {
                debug!(target = %target, "Handling GetPublicKey request");
                match self.store.get_public_key(&target) {
                    Some(public_key) => Frame::response(
                        ctx.version,
                        ResponseCode::PublicKey,
                        PublicKeyResponse {
                            id: target,
                            public_key,
                        }
                        .encode(),
                    ),
                    None => {
                        debug!(target = %target, "Unknown target, sending error 9000");
                        Frame::error(ctx.version)
                    }
                }
            }
            Request::SendMessage(req) => self.send_message(ctx, req),
            Request::FetchMessages => self.fetch_messages(ctx),
        }
    }

    fn send_message(&self, ctx: &RequestContext, req: SendMessageRequest) -> Frame {
        debug!(
            to = %req.to,
            message_type = %req.message_type,
            content_len = req.content.len(),
            "Handling SendMessage request"
        );

        let content = match req.message_type {
            // The stored content of a key request is the target's public key,
            // delivered to whoever fetches the recipient's mailbox.
            MessageType::KeyRequest => self
                .store
                .get_public_key(&req.to)
                .map(|key| key.as_bytes().to_vec())
                .unwrap_or_default(),
            MessageType::SymmetricKey | MessageType::Text | MessageType::File => {
                if self.store.contains(&req.to) {
                    req.content
                } else {
                    warn!(
                        to = %req.to,
                        dropped_bytes = req.content.len(),
                        "Recipient not registered, storing empty content"
                    );
                    Vec::new()
                }
            }
        };

        let message_id = self.store.store_message(ctx.client_id, req.to, req.message_type, content);
        Frame::response(
            ctx.version,
            ResponseCode::MessageStored,
            SendMessageResponse {
                to: req.to,
                message_id,
            }
            .encode(),
        )
    }

    fn fetch_messages(&self, ctx: &RequestContext) -> Frame {
        let records: Vec<MailboxRecord> = self
            .store
            .fetch_messages(&ctx.client_id)
            .into_iter()
            .map(|entry| MailboxRecord {
                from: entry.from,
                message_id: entry.id,
                message_type: entry.message_type,
                content: entry.content,
            })
            .collect();
        debug!(count = records.len(), "Handling FetchMessages request");

        match payload::encode_mailbox(&records) {
            Ok(body) => Frame::response(ctx.version, ResponseCode::Messages, body),
            Err(e) => {
                warn!(error = %e, lost = records.len(), "Failed to encode mailbox");
                Frame::error(ctx.version)
            }
        }
    }

    /// Serves one connection until the peer closes it or framing fails.
    ///
    /// Requests are answered strictly in order. The store lock is only taken
    /// inside [`RequestHandler::handle`], never while reading or writing.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        loop {
            match conn.read_request().await {
                Ok(Some(Inbound::Request(frame))) => {
                    let response = self.handle(&frame);
                    conn.write_response(&response).await?;
                }
                Ok(Some(Inbound::Oversized(header))) => {
                    warn!(
                        peer = %conn.peer_addr(),
                        code = header.code,
                        payload_len = header.payload_len,
                        "Request payload over limit, sending error 9000"
                    );
                    conn.write_response(&Frame::error(self.server_version)).await?;
                }
                Ok(None) => {
                    debug!(peer = %conn.peer_addr(), "Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(peer = %conn.peer_addr(), error = %e, "Error reading request");
                    return Err(e);
                }
            }
        }
    }
}

/// Boxed future returned by a connection handler.
pub type ConnectionFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Creates a connection handler function for use with [`crate::RelayServer::run`].
pub fn make_connection_handler(
    store: SharedStore,
    server_version: u8,
) -> impl Fn(Connection) -> ConnectionFuture + Send + Sync + 'static {
    move |conn| {
        let handler = RequestHandler::new(store.clone(), server_version);
        Box::pin(async move {
            let peer = conn.peer_addr();
            if let Err(e) = handler.handle_connection(conn).await {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        })
    }
}
