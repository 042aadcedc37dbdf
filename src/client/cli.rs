//! Command-line front end for [`KeybeatClient`].
//!
//! ```text
//! keybeat_client verify <key>
//! keybeat_client heartbeat <key> <user> [--meta '<json>'] [--loop]
//! keybeat_client status <user>
//! keybeat_client add-license <key> <owner> [--expires <ms>] [--hwid <id>]
//! keybeat_client list-heartbeats
//! ```
//!
//! Admin commands read the token from `admin.token` in the configuration.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::api::KeybeatClient;
use crate::client::errors::ClientResult;
use crate::client::heartbeat::run_heartbeat_loop;
use crate::models::{iso8601, HeartbeatRecord};

/// A parsed client command.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Verify {
        key: String,
    },
    Heartbeat {
        key: String,
        user: String,
        meta: Option<Value>,
        repeat: bool,
    },
    Status {
        user: String,
    },
    AddLicense {
        key: String,
        owner: String,
        expires: Option<i64>,
        hwid: Option<String>,
    },
    ListHeartbeats,
    /// Unrecognized or incomplete input
    Help,
}

/// Value following `flag`, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Parse process arguments (including the program name at index 0).
pub fn parse_client_command(args: &[String]) -> ClientCommand {
    let Some(command) = args.get(1) else {
        return ClientCommand::Help;
    };
    let rest = &args[2..];

    match (command.as_str(), rest) {
        ("verify", [key, ..]) => ClientCommand::Verify { key: key.clone() },
        ("heartbeat", [key, user, ..]) => {
            let meta = match flag_value(rest, "--meta").map(|m| serde_json::from_str(&m)) {
                Some(Ok(meta)) => Some(meta),
                Some(Err(e)) => {
                    eprintln!("Error: --meta must be valid JSON: {e}");
                    return ClientCommand::Help;
                }
                None => None,
            };
            ClientCommand::Heartbeat {
                key: key.clone(),
                user: user.clone(),
                meta,
                repeat: rest.iter().any(|a| a == "--loop"),
            }
        }
        ("status", [user, ..]) => ClientCommand::Status { user: user.clone() },
        ("add-license", [key, owner, ..]) => ClientCommand::AddLicense {
            key: key.clone(),
            owner: owner.clone(),
            expires: flag_value(rest, "--expires").and_then(|e| e.parse().ok()),
            hwid: flag_value(rest, "--hwid"),
        },
        ("list-heartbeats", _) => ClientCommand::ListHeartbeats,
        _ => ClientCommand::Help,
    }
}

pub fn usage() -> &'static str {
    "usage:
  keybeat_client verify <key>
  keybeat_client heartbeat <key> <user> [--meta '<json>'] [--loop]
  keybeat_client status <user>
  keybeat_client add-license <key> <owner> [--expires <ms>] [--hwid <id>]
  keybeat_client list-heartbeats"
}

/// Run a parsed command against the server.
pub async fn execute_client_command(
    client: &KeybeatClient,
    cmd: ClientCommand,
    admin_token: Option<&str>,
    heartbeat_every: Duration,
) -> ClientResult<()> {
    match cmd {
        ClientCommand::Verify { key } => {
            let valid = client.verify(&key).await?;
            println!("{key}: {}", if valid { "valid" } else { "invalid" });
        }
        ClientCommand::Heartbeat {
            key,
            user,
            meta,
            repeat: false,
        } => {
            let timestamp = client.heartbeat(&key, &user, meta.as_ref()).await?;
            println!("Heartbeat saved at {}", iso8601(timestamp));
        }
        ClientCommand::Heartbeat {
            key,
            user,
            meta,
            repeat: true,
        } => {
            let shutdown = CancellationToken::new();
            let stopper = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stopper.cancel();
                }
            });
            let stats =
                run_heartbeat_loop(client.clone(), key, user, meta, heartbeat_every, shutdown)
                    .await;
            println!("Sent {} heartbeats ({} failed)", stats.sent, stats.failed);
        }
        ClientCommand::Status { user } => {
            let status = client.status(&user).await?;
            let state = if status.online { "online" } else { "offline" };
            match status.human_last {
                Some(last) => println!("{user}: {state} (last seen {last})"),
                None => println!("{user}: {state} (never seen)"),
            }
        }
        ClientCommand::AddLicense {
            key,
            owner,
            expires,
            hwid,
        } => {
            let token = admin_token.unwrap_or_default();
            let added = client
                .add_license(token, &key, &owner, expires, hwid.as_deref())
                .await?;
            println!("License {} issued to {}", added.key, added.meta.owner);
        }
        ClientCommand::ListHeartbeats => {
            let token = admin_token.unwrap_or_default();
            let list = client.list_heartbeats(token).await?;
            if list.heartbeats.is_empty() {
                println!("No heartbeats recorded.");
            }
            for (user, entry) in list.heartbeats {
                let key = entry.get("key").and_then(Value::as_str).unwrap_or("?");
                let last = HeartbeatRecord::stored_last(&entry).map(iso8601);
                println!("{user}\t{key}\t{}", last.as_deref().unwrap_or("?"));
            }
        }
        ClientCommand::Help => println!("{}", usage()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("keybeat_client")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_verify() {
        assert_eq!(
            parse_client_command(&args(&["verify", "ABC"])),
            ClientCommand::Verify { key: "ABC".into() }
        );
    }

    #[test]
    fn parses_heartbeat_with_meta_and_loop() {
        assert_eq!(
            parse_client_command(&args(&[
                "heartbeat",
                "ABC",
                "alice",
                "--meta",
                r#"{"v":1}"#,
                "--loop"
            ])),
            ClientCommand::Heartbeat {
                key: "ABC".into(),
                user: "alice".into(),
                meta: Some(json!({"v": 1})),
                repeat: true,
            }
        );
    }

    #[test]
    fn bad_meta_is_help() {
        assert_eq!(
            parse_client_command(&args(&["heartbeat", "ABC", "alice", "--meta", "{"])),
            ClientCommand::Help
        );
    }

    #[test]
    fn parses_add_license_flags() {
        assert_eq!(
            parse_client_command(&args(&[
                "add-license",
                "ABC",
                "alice",
                "--expires",
                "1700000000000",
                "--hwid",
                "box-1"
            ])),
            ClientCommand::AddLicense {
                key: "ABC".into(),
                owner: "alice".into(),
                expires: Some(1_700_000_000_000),
                hwid: Some("box-1".into()),
            }
        );
    }

    #[test]
    fn incomplete_commands_are_help() {
        assert_eq!(parse_client_command(&args(&[])), ClientCommand::Help);
        assert_eq!(parse_client_command(&args(&["verify"])), ClientCommand::Help);
        assert_eq!(
            parse_client_command(&args(&["heartbeat", "ABC"])),
            ClientCommand::Help
        );
        assert_eq!(parse_client_command(&args(&["bogus"])), ClientCommand::Help);
    }
}
