//! keyrelay CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use keyrelay_client::cli::{Cli, Command};
use keyrelay_client::commands::messaging::{self, Session};
use keyrelay_client::commands::server::{self, ServerOptions};
use keyrelay_client::config::ClientConfig;
use keyrelay_client::error::{ClientError, ClientResult};
use keyrelay_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match &cli.command {
        Command::Server { json_logs, .. } => {
            let config = TracingConfig::daemon();
            let config = if *json_logs {
                config.with_format(TracingOutputFormat::Json)
            } else {
                config
            };
            if cli.debug {
                config.with_level(Level::DEBUG)
            } else {
                config
            }
        }
        _ if cli.debug => TracingConfig::cli_debug(),
        _ => TracingConfig::default(),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load_from(path).map_err(ClientError::Config)?,
        None => ClientConfig::load().map_err(ClientError::Config)?,
    };

    let session = Session {
        address: cli.server.clone().unwrap_or(config.server.address.clone()),
        timeout: cli
            .timeout
            .map(std::time::Duration::from_secs)
            .unwrap_or(config.timeout()),
        identity_path: cli.identity.clone().unwrap_or_else(|| config.identity_path()),
        json: cli.json,
    };

    let output = match cli.command {
        Command::Server {
            host,
            port,
            port_file,
            server_config,
            json_logs: _,
        } => {
            return server::run(ServerOptions {
                host,
                port,
                port_file,
                server_config,
            })
            .await;
        }
        Command::Register {
            name,
            public_key_file,
        } => messaging::register(&session, &name, public_key_file.as_deref()).await?,
        Command::Users => messaging::users(&session).await?,
        Command::GetKey { id } => messaging::get_key(&session, id).await?,
        Command::RequestKey { id } => messaging::request_key(&session, id).await?,
        Command::SendKey { id, key } => messaging::send_key(&session, id, &key).await?,
        Command::SendText { id, text } => messaging::send_text(&session, id, &text).await?,
        Command::SendFile { id, path } => messaging::send_file(&session, id, &path).await?,
        Command::Fetch => messaging::fetch(&session).await?,
    };

    println!("{}", output);
    Ok(())
}
