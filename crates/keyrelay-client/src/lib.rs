//! CLI, TCP client, identity file
//!
//! This crate provides the `keyrelay` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod output;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use socket::RelayClient;
