// src/client/main.rs

use std::time::Duration;

use keybeat::client::api::KeybeatClient;
use keybeat::client::cli::{execute_client_command, parse_client_command, ClientCommand};
use keybeat::config::get_config;
use tracing_subscriber::EnvFilter;

/// Command-line client for a keybeat server.
///
/// Server URL, heartbeat interval and admin token come from the same
/// configuration sources as the server (`keybeat.toml`, `KEYBEAT_*`).
#[tokio::main]
async fn main() {
    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let cmd = parse_client_command(&args);
    let is_help = cmd == ClientCommand::Help;

    let client = KeybeatClient::new(&config.client.server_url);
    let admin_token = config.admin.secret();
    let every = Duration::from_secs(config.client.heartbeat_interval_secs);

    if let Err(e) = execute_client_command(&client, cmd, admin_token.as_deref(), every).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if is_help {
        std::process::exit(2);
    }
}
