//! Relay daemon: client directory, mailboxes and request dispatch.
//!
//! This crate provides the keyrelay server that:
//! - accepts TCP connections and reads length-prefixed binary frames
//! - keeps an in-memory directory of registered clients and their keys
//! - queues messages per recipient until they are fetched
//!
//! # Example
//!
//! ```rust,no_run
//! use keyrelay_server::{
//!     RelayServer, ServerConfig, SignalHandler, make_connection_handler, new_shared_store,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let version = config.version;
//!     let server = RelayServer::bind(config).await?;
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!
//!     let handler = make_connection_handler(new_shared_store(), version);
//!     server.run_until_shutdown(handler, signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handler;
mod signals;
mod socket;
mod store;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, PORT_FILE_NAME, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{
    ConnectionFuture, Request, RequestContext, RequestHandler, make_connection_handler,
};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, Inbound, RelayServer};
pub use store::{SharedStore, Store, new_shared_store};
