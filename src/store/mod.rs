//! Session storage backends.
//!
//! Every backend implements the container-style [`SessionStore`] contract on
//! raw, already-encrypted payloads. The lifecycle semantics (encryption, the
//! spam gate, no-op writes, the failure policy) live in
//! [`SessionHandler`](crate::SessionHandler).

use std::fmt::{self, Debug};
use std::future::Future;
use std::path::PathBuf;

use tower_cookies::Cookies;

use crate::Id;

mod any;
pub mod cookie;
pub mod file;
pub mod memory;

#[cfg(feature = "memcached-store")]
pub mod memcached;

#[cfg(feature = "mysql-store")]
pub mod mysql;

#[cfg(feature = "redis-store")]
pub mod redis;

pub use any::AnyStore;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "redis-store")]
    #[error(transparent)]
    Redis(#[from] fred::error::Error),

    #[cfg(feature = "mysql-store")]
    #[error(transparent)]
    MySql(#[from] sqlx::Error),

    #[cfg(feature = "memcached-store")]
    #[error(transparent)]
    Memcached(#[from] memcache::MemcacheError),
}

/// What a store is told when a request's session is opened.
#[derive(Clone, Default)]
pub struct OpenContext {
    /// Backend-specific location, e.g. the directory of the file store.
    pub save_path: Option<PathBuf>,
    /// The session name, i.e. the name of the id cookie.
    pub name: String,
    /// The request's cookie jar, when one is available.
    pub cookies: Option<Cookies>,
}

impl Debug for OpenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenContext")
            .field("save_path", &self.save_path)
            .field("name", &self.name)
            .field("cookies", &self.cookies.is_some())
            .finish()
    }
}

impl OpenContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    pub fn with_cookies(mut self, cookies: Cookies) -> Self {
        self.cookies = Some(cookies);
        self
    }
}

/// A backend that persists encrypted session payloads.
///
/// One instance serves one request: it is cloned from the configured
/// prototype, opened, used and closed. Implementations must return `None`
/// from [`get`](SessionStore::get) for a missing or expired record and must
/// never conflate that with an empty payload.
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Acquires the backend handle for this request.
    fn open(&mut self, cx: &OpenContext) -> impl Future<Output = Result<(), Error>> + Send;

    /// Gets the payload stored at `session_id`.
    fn get(&mut self, session_id: &Id) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Stores `payload` at `session_id`, expiring after `ttl_secs`.
    fn set(
        &mut self,
        session_id: &Id,
        payload: &[u8],
        ttl_secs: i64,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Resets the expiry of `session_id` without rewriting it.
    ///
    /// Returns `false` if there is no record to touch.
    fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Deletes the record at `session_id`. Returns `true` if one was removed.
    fn delete(&mut self, session_id: &Id) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Purges records older than `max_lifetime_secs`, returning how many were
    /// removed. Backends that expire records on their own return `0`.
    fn gc(&mut self, max_lifetime_secs: i64) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Releases the backend handle.
    fn close(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Seconds since the unix epoch.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
