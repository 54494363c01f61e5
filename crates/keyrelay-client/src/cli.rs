//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use keyrelay_core::ClientId;

/// keyrelay - store-and-forward key and message relay
#[derive(Debug, Parser)]
#[command(name = "keyrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "KEYRELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Relay address (host:port), overrides the config file
    #[arg(long, env = "KEYRELAY_SERVER", global = true)]
    pub server: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Identity file written by `register`
    #[arg(long, env = "KEYRELAY_IDENTITY", global = true)]
    pub identity: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the relay in the foreground
    Server {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long, short, conflicts_with = "port_file")]
        port: Option<u16>,

        /// Read the port from a one-line file such as myport.info
        #[arg(long)]
        port_file: Option<PathBuf>,

        /// Server TOML configuration
        #[arg(long)]
        server_config: Option<PathBuf>,

        /// Emit JSON log lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Register a name and store the assigned identifier
    Register {
        /// Display name (ASCII, at most 254 bytes)
        name: String,

        /// File holding the 160-byte public key
        #[arg(long)]
        public_key_file: Option<PathBuf>,
    },

    /// List other registered clients
    Users,

    /// Print a client's public key
    GetKey {
        /// Target client identifier (32 hex digits)
        id: ClientId,
    },

    /// Ask the relay to deliver a client's public key to that client's mailbox
    RequestKey { id: ClientId },

    /// Send a symmetric key blob
    SendKey {
        id: ClientId,
        /// Key material, base64 encoded
        key: String,
    },

    /// Send a text message
    SendText { id: ClientId, text: String },

    /// Send a file's contents
    SendFile { id: ClientId, path: PathBuf },

    /// Fetch and print pending messages
    Fetch,
}
