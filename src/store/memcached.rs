//! Memcached session storage.
//!
//! This module requires the `memcached-store` feature flag.

use std::sync::Arc;

use crate::Id;
use crate::store::{Error, OpenContext, SessionStore};

/// Memcached caps relative expirations at 30 days; larger values are read
/// as absolute unix timestamps.
const MAX_RELATIVE_TTL: i64 = 60 * 60 * 24 * 30;

/// A Memcached-backed session store.
///
/// The client is connected when the session is opened and dropped when it is
/// closed. The `memcache` client is blocking, so every call runs on tokio's
/// blocking pool.
#[derive(Clone)]
pub struct MemcachedStore {
    url: String,
    namespace: String,
    client: Option<Arc<memcache::Client>>,
}

impl std::fmt::Debug for MemcachedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedStore")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("connected", &self.client.is_some())
            .finish()
    }
}

impl MemcachedStore {
    /// Creates a store for `url`, e.g. `memcache://127.0.0.1:11211`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: "session:".to_string(),
            client: None,
        }
    }

    /// Creates a store for `hostname:port`.
    pub fn from_host(hostname: &str, port: u16) -> Self {
        Self::new(format!("memcache://{hostname}:{port}"))
    }

    /// Sets the key prefix. Defaults to `session:`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn key(&self, session_id: &Id) -> String {
        format!("{}{}", self.namespace, session_id)
    }

    fn client(&self) -> Result<Arc<memcache::Client>, Error> {
        self.client
            .clone()
            .ok_or_else(|| Error::Connection("memcached store used before open".to_string()))
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T, memcache::MemcacheError> + Send + 'static,
    {
        let client = self.client()?;
        tokio::task::spawn_blocking(move || op(&client))
            .await
            .map_err(|err| Error::Backend(err.to_string()))?
            .map_err(Error::from)
    }
}

fn expiration(ttl_secs: i64) -> u32 {
    ttl_secs.clamp(0, MAX_RELATIVE_TTL) as u32
}

impl SessionStore for MemcachedStore {
    #[tracing::instrument(name = "connecting to memcached", skip(self, _cx), fields(url = %self.url))]
    async fn open(&mut self, _cx: &OpenContext) -> Result<(), Error> {
        if self.client.is_some() {
            return Ok(());
        }

        let url = self.url.clone();
        let client = tokio::task::spawn_blocking(move || memcache::connect(url.as_str()))
            .await
            .map_err(|err| Error::Connection(err.to_string()))?
            .map_err(|err| {
                tracing::error!(err = %err, "failed to connect to memcached");
                Error::Connection(err.to_string())
            })?;

        self.client = Some(Arc::new(client));
        Ok(())
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        let key = self.key(session_id);
        self.blocking(move |client| client.get::<Vec<u8>>(&key)).await
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        let key = self.key(session_id);
        let payload = payload.to_vec();
        let exp = expiration(ttl_secs);
        self.blocking(move |client| client.set(&key, payload.as_slice(), exp))
            .await?;
        Ok(true)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        let key = self.key(session_id);
        let exp = expiration(ttl_secs);
        self.blocking(move |client| client.touch(&key, exp)).await
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        let key = self.key(session_id);
        self.blocking(move |client| client.delete(&key)).await
    }

    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        Ok(0)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_generation() {
        let store = MemcachedStore::from_host("localhost", 11211);
        assert_eq!(store.url(), "memcache://localhost:11211");

        let session_id = Id::generate();
        assert_eq!(store.key(&session_id), format!("session:{session_id}"));
    }

    #[test]
    fn test_expiration_is_clamped() {
        assert_eq!(expiration(-5), 0);
        assert_eq!(expiration(1440), 1440);
        assert_eq!(expiration(i64::MAX), MAX_RELATIVE_TTL as u32);
    }

    #[tokio::test]
    async fn test_calls_before_open_fail() {
        let mut store = MemcachedStore::from_host("localhost", 11211);
        assert!(store.get(&Id::generate()).await.is_err());
    }
}
