//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use keybeat::server::database::Database;
use keybeat::server::handlers::AppState;
use keybeat::server::routes::build_router;

pub const ADMIN_TOKEN: &str = "test-admin-secret";

/// Router over a fresh in-memory store with the admin token configured.
pub fn test_app() -> (Router, Arc<Database>) {
    let db = Database::memory();
    let state = AppState::new(db.clone(), Some(ADMIN_TOKEN.to_string()));
    (build_router(state), db)
}

/// Send a request and decode the JSON response body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body.unwrap_or_default().to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));

    (status, body)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, &[], Some(&body.to_string())).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, &[], None).await
}

/// Issue a license through the admin endpoint.
pub async fn add_license(app: &Router, key: &str, owner: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/admin/add_license",
        &[("x-admin-token", ADMIN_TOKEN)],
        Some(&json!({ "key": key, "owner": owner }).to_string()),
    )
    .await
}
