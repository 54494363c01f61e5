//! Subcommand implementations.

pub mod messaging;
pub mod server;
