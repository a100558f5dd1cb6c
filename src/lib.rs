//! # Seshat: pluggable, encrypted session persistence for Tower applications
//!
//! `seshat` persists HTTP sessions in one of several interchangeable backends
//! (files, MySQL, Redis, Memcached or the client's own cookies), sealing every
//! payload with AES-256-GCM before it reaches storage.
//!
//! # Quick Start
//!
//! Here's a basic example with [Axum](https://docs.rs/axum/latest/axum/) and a
//! backend chosen from the environment (`SESSION_BACKEND`, `SESSION_KEY`, ...).
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use seshat::{Session, SessionConfig, SessionLayer};
//! use tower_cookies::CookieManagerLayer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::from_env().unwrap();
//!     let session_layer = SessionLayer::from_config(&config).await.unwrap();
//!
//!     // Set up router with session management
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(session_layer)
//!         .layer(CookieManagerLayer::new()); // CookieManagerLayer must be after
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//!
//! async fn handler(session: Session) -> String {
//!     let count: Option<i32> = session.get("count").unwrap();
//!     let new_count = count.unwrap_or(0) + 1;
//!     session.insert("count", &new_count).unwrap();
//!     format!("You've visited this page {} times", new_count)
//! }
//! ```
//!
//! # Session Management
//!
//! ```rust,no_run
//! use seshat::Session;
//!
//! async fn handler(session: Session) {
//! // Read and write typed fields
//! let user: Option<String> = session.get("user").unwrap();
//! session.insert("user", "alice").unwrap();
//!
//! // Remove a single field, or all of them
//! session.remove("user");
//! session.clear();
//!
//! // Move the session to a fresh id, e.g. after logging in
//! session.regenerate();
//!
//! // Delete the record and the session cookie
//! session.destroy();
//! # }
//! ```
//!
//! Changes are kept in memory during the request and persisted by the
//! [`SessionLayer`] once the handler has responded. An unchanged session only
//! has its expiry extended. With [`SessionMode::ReadOnly`] nothing is written.
//!
//! # Stores
//!
//! | backend | feature | expiry |
//! | --- | --- | --- |
//! | [`FileStore`](store::file::FileStore) | | header in each file, purged by `gc` |
//! | [`MySqlStore`](store::mysql) | `mysql-store` | `expires_at` column, purged by `gc` |
//! | [`RedisStore`](store::redis) | `redis-store` | `SET EX` / `EXPIRE` |
//! | [`MemcachedStore`](store::memcached) | `memcached-store` | item expiration |
//! | [`CookieStore`](store::cookie::CookieStore) | | cookie lifetime |
//!
//! Redis and Memcached enable the spam gate by default: an id that does not
//! map to a stored record turns every further operation of the request into
//! a no-op instead of reaching the backend.
//!
//! ## Serialization
//! Session fields are serialized with one of:
//!
//! - [`bincode`](https://crates.io/crates/bincode) (default) - Fast, compact binary serialization.
//! - [`rmp-serde`](https://crates.io/crates/rmp-serde) (MessagePack) - Cross-language compatible serialization.
//!
//! ```toml
//! [dependencies]
//! seshat = { version = "0.3", default-features = false, features = ["axum", "messagepack"] }
//! ```
//!
//! # Important Notes
//!
//! ## Middleware Ordering
//! The `SessionLayer` must be applied **before** the `CookieManagerLayer`:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::Router;
//! use seshat::{AesGcmCipher, SessionLayer, store::memory::MemoryStore};
//! use tower_cookies::CookieManagerLayer;
//!
//! let app: Router<()> = Router::new();
//! let cipher = Arc::new(AesGcmCipher::from_passphrase("secret").unwrap());
//! let session_layer = SessionLayer::new(MemoryStore::new(), cipher);
//!
//! // Correct order
//! let router = app
//!     .layer(session_layer)
//!     .layer(CookieManagerLayer::new());
//! ```

pub use cookie;

pub mod cipher;
pub use cipher::{AesGcmCipher, Cipher};

mod config;
pub use config::{Backend, Error as ConfigError, SessionConfig};

#[cfg(feature = "axum")]
mod extract;

#[cfg(feature = "redis-store")]
pub use fred;

#[cfg(feature = "mysql-store")]
pub use sqlx;

pub mod handler;
pub use handler::{Error as HandlerError, FailurePolicy, Gate, HandlerOptions, SessionHandler};

mod service;
pub use service::*;

mod session;
pub use session::*;

pub mod store;

pub use tower_cookies;
