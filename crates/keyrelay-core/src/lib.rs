//! Core types: client identity, mailbox records, tracing setup

pub mod identity;
pub mod message;
pub mod tracing;

pub use identity::{
    CLIENT_ID_SIZE, ClientId, ClientName, IdentityError, MAX_NAME_LEN, NAME_FIELD_SIZE,
    PUBLIC_KEY_SIZE, PublicKey,
};
pub use message::{ClientRecord, MailboxEntry, MessageId, MessageType};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
