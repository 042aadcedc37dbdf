//! The bundled client against a live server on a loopback port.

#![cfg(feature = "server")]

use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use keybeat::client::api::KeybeatClient;
use keybeat::client::errors::ClientErrorCode;
use keybeat::client::heartbeat::run_heartbeat_loop;
use keybeat::server::database::Database;
use keybeat::server::handlers::AppState;
use keybeat::server::routes::build_router;

const TOKEN: &str = "client-test-token";

/// Serve a fresh in-memory app and return its base URL.
async fn spawn_server() -> String {
    let state = AppState::new(Database::memory(), Some(TOKEN.to_string()));
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn client_round_trip() {
    let client = KeybeatClient::new(spawn_server().await);

    assert!(!client.verify("ABC").await.unwrap());

    let added = client
        .add_license(TOKEN, "ABC", "alice", None, Some("hw-1"))
        .await
        .unwrap();
    assert!(added.added);
    assert_eq!(added.meta.hwid, "hw-1");

    assert!(client.verify("ABC").await.unwrap());

    let meta = json!({"version": "1.2.3"});
    let ts = client.heartbeat("ABC", "alice", Some(&meta)).await.unwrap();
    assert!(ts > 0);

    let status = client.status("alice").await.unwrap();
    assert!(status.online);
    assert_eq!(status.last, Some(ts));
    assert_eq!(status.meta, Some(meta));

    let list = client.list_heartbeats(TOKEN).await.unwrap();
    assert_eq!(list.heartbeats["alice"]["key"], "ABC");
}

#[tokio::test]
async fn client_surfaces_error_codes() {
    let client = KeybeatClient::new(spawn_server().await);

    let err = client.heartbeat("NOPE", "bob", None).await.unwrap_err();
    assert_eq!(err.code(), Some(ClientErrorCode::InvalidKey));

    let err = client.list_heartbeats("wrong").await.unwrap_err();
    assert_eq!(err.code(), Some(ClientErrorCode::Unauthorized));

    let status = client.status("nobody").await.unwrap();
    assert!(!status.online);
    assert!(status.last.is_none());
}

#[tokio::test]
async fn heartbeat_loop_sends_until_cancelled() {
    let client = KeybeatClient::new(spawn_server().await);
    client
        .add_license(TOKEN, "LOOP", "erin", None, None)
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run_heartbeat_loop(
        client.clone(),
        "LOOP".into(),
        "erin".into(),
        None,
        Duration::from_millis(20),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    let stats = handle.await.unwrap();

    assert!(stats.sent >= 2, "expected several heartbeats, got {stats:?}");
    assert_eq!(stats.failed, 0);
    assert!(client.status("erin").await.unwrap().online);
}

#[tokio::test]
async fn heartbeat_loop_stops_on_invalid_key() {
    let client = KeybeatClient::new(spawn_server().await);

    let stats = run_heartbeat_loop(
        client,
        "MISSING".into(),
        "frank".into(),
        None,
        Duration::from_millis(10),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(stats.sent, 0);
    assert_eq!(stats.failed, 1);
}
