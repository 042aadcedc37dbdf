//! keybeat - license key validation and heartbeat presence tracking
//!
//! Clients verify a license key and periodically send heartbeats; admins
//! issue licenses and inspect who is online. All state lives in an external
//! key-value store under two keys, `licenses` and `heartbeats`.
//!
//! # Features
//!
//! - `server` - HTTP server components (router, handlers, storage). Enabled by default.
//! - `sqlite` - SQLite storage backend. Enabled by default.
//! - `postgres` - PostgreSQL storage backend.
//!
//! The in-memory backend and the client are always available.

// Core modules (always available)
pub mod config;
pub mod errors;
pub mod models;

// Client-related modules (always available)
pub mod client {
    pub mod api;
    pub mod cli;
    pub mod errors;
    pub mod heartbeat;

    pub use api::KeybeatClient;
}

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
