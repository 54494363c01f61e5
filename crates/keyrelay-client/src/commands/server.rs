//! Server command: runs the relay in the foreground until SIGINT/SIGTERM.

use std::path::PathBuf;

use tracing::info;

use keyrelay_server::{
    RelayServer, ServerConfig, SignalHandler, make_connection_handler, new_shared_store,
};

use crate::error::{ClientError, ClientResult};

/// Options collected from `keyrelay server`.
#[derive(Debug, Default)]
pub struct ServerOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub port_file: Option<PathBuf>,
    pub server_config: Option<PathBuf>,
}

/// Resolves the final server configuration.
///
/// Precedence: explicit `--port`/`--host`, then `--port-file`, then the TOML
/// file, then defaults.
pub fn resolve_config(options: &ServerOptions) -> ClientResult<ServerConfig> {
    let mut config = match &options.server_config {
        Some(path) => {
            ServerConfig::load_from(path).map_err(|e| ClientError::Config(e.to_string()))?
        }
        None => ServerConfig::default(),
    };

    if let Some(path) = &options.port_file {
        config = config.with_port(ServerConfig::port_from_file(path));
    }
    if let Some(port) = options.port {
        config = config.with_port(port);
    }
    if let Some(host) = &options.host {
        config = config.with_host(host.clone());
    }
    Ok(config)
}

/// Starts the relay and blocks until a shutdown signal arrives.
pub async fn run(options: ServerOptions) -> ClientResult<()> {
    let config = resolve_config(&options)?;
    let version = config.version;

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let server = RelayServer::bind(config)
        .await
        .map_err(|e| ClientError::Config(format!("failed to start relay: {}", e)))?;

    let store = new_shared_store();
    let handler = make_connection_handler(store.clone(), version);

    server
        .run_until_shutdown(handler, signal_handler.shutdown().wait())
        .await
        .map_err(|e| ClientError::Config(format!("server error: {}", e)))?;

    info!(
        clients = store.client_count(),
        pending = store.pending_count(),
        "Relay stopped"
    );
    Ok(())
}
