//! Router behavior on top of the SQLite backend.

#![cfg(all(feature = "server", feature = "sqlite"))]

mod common;

use std::sync::Arc;

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

use common::{get, post_json, send, ADMIN_TOKEN};
use keybeat::models::{HEARTBEATS_KEY, LICENSES_KEY};
use keybeat::server::database::Database;
use keybeat::server::handlers::AppState;
use keybeat::server::repository::Repository;
use keybeat::server::routes::build_router;

/// In-memory SQLite database with the `kv_store` table created.
async fn setup_sqlite() -> Arc<Database> {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");

    let db = Arc::new(Database::SQLite(pool));
    db.migrate().await.expect("failed to create kv_store");
    db
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let db = setup_sqlite().await;
    db.migrate().await.unwrap();
    assert_eq!(db.backend_name(), "sqlite");
}

#[tokio::test]
async fn lifecycle_persists_through_sqlite() {
    let db = setup_sqlite().await;
    let app = build_router(AppState::new(db.clone(), Some(ADMIN_TOKEN.to_string())));

    let (status, _) = send(
        &app,
        "POST",
        "/api/admin/add_license",
        &[("x-admin-token", ADMIN_TOKEN)],
        Some(&json!({"key": "SQL-1", "owner": "dana"}).to_string()),
    )
    .await;
    assert!(status.is_success());

    let (_, body) = post_json(&app, "/api/verify", json!({"key": "SQL-1"})).await;
    assert_eq!(body["valid"], true);

    let (_, body) = post_json(
        &app,
        "/api/heartbeat",
        json!({"key": "SQL-1", "user": "dana", "meta": ["a", 1]}),
    )
    .await;
    assert_eq!(body["saved"], true);

    let (_, body) = get(&app, "/api/status?user=dana").await;
    assert_eq!(body["online"], true);
    assert_eq!(body["meta"], json!(["a", 1]));

    let stored = db.get(LICENSES_KEY).await.unwrap().unwrap();
    assert_eq!(stored["SQL-1"]["owner"], "dana");

    // A second repository over the same pool sees the same data.
    let repo = Repository::new(db.clone());
    let heartbeats = repo.load_heartbeats().await.unwrap();
    assert_eq!(heartbeats["dana"]["key"], "SQL-1");
}

#[tokio::test]
async fn invalid_stored_json_is_healed() {
    let db = setup_sqlite().await;
    if let Database::SQLite(pool) = db.as_ref() {
        sqlx::query("INSERT INTO kv_store (key, value) VALUES (?, ?)")
            .bind(HEARTBEATS_KEY)
            .bind("{broken")
            .execute(pool)
            .await
            .unwrap();
    }

    let repo = Repository::new(db.clone());
    assert!(repo.load_heartbeats().await.unwrap().is_empty());
    assert_eq!(db.get(HEARTBEATS_KEY).await.unwrap(), Some(json!({})));
}
