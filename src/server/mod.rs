// src/server/mod.rs

//! Server-side components for keybeat.
//!
//! This module contains:
//! - `database`    → key-value storage over memory/SQLite/Postgres
//! - `repository`  → typed load/save of the `licenses` and `heartbeats` mappings
//! - `handlers`    → request parsing and the five operations
//! - `routes`      → prefix routing and the router builder
//! - `auth`        → admin shared-secret check
//! - `api_error`   → `{ok:false, error}` responses
//! - `logging`     → request logging middleware and audit events

pub mod api_error;
pub mod auth;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod repository;
pub mod routes;

pub use api_error::{ApiError, ErrorCode};
pub use database::{Database, MemoryStore};
pub use handlers::{dispatch, AppState, RequestContext};
pub use repository::{Heartbeats, Licenses, Repository};
pub use routes::{build_router, Route};
