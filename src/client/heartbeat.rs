use std::time::Duration;

use serde_json::Value;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::api::KeybeatClient;
use crate::client::errors::ClientResult;
use crate::models::ONLINE_THRESHOLD_MS;

/// Sends a single heartbeat and returns the server timestamp.
pub async fn send_heartbeat(
    client: &KeybeatClient,
    key: &str,
    user: &str,
    meta: Option<&Value>,
) -> ClientResult<i64> {
    client.heartbeat(key, user, meta).await
}

/// Outcome counters of a heartbeat loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub sent: u64,
    pub failed: u64,
}

/// Send heartbeats every `every` until `shutdown` is cancelled.
///
/// The first heartbeat goes out immediately. Failures are logged and the
/// loop carries on with the next tick; an `invalid_key` rejection stops the
/// loop since no later tick can succeed.
pub async fn run_heartbeat_loop(
    client: KeybeatClient,
    key: String,
    user: String,
    meta: Option<Value>,
    every: Duration,
    shutdown: CancellationToken,
) -> HeartbeatStats {
    if every.as_millis() >= ONLINE_THRESHOLD_MS as u128 {
        warn!(
            "Heartbeat interval {:?} is not shorter than the online threshold; the user will flap offline",
            every
        );
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = HeartbeatStats::default();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(sent = stats.sent, failed = stats.failed, "Heartbeat loop stopped");
                return stats;
            }
            _ = ticker.tick() => {
                match send_heartbeat(&client, &key, &user, meta.as_ref()).await {
                    Ok(timestamp) => {
                        stats.sent += 1;
                        info!(user = %user, timestamp, "Heartbeat sent");
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!(user = %user, "Heartbeat failed: {e}");
                        if e.code().is_some_and(|c| c.is_license_invalid()) {
                            return stats;
                        }
                    }
                }
            }
        }
    }
}
