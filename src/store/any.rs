use crate::Id;
use crate::store::cookie::CookieStore;
use crate::store::file::FileStore;
use crate::store::memory::MemoryStore;
use crate::store::{Error, OpenContext, SessionStore};

#[cfg(feature = "memcached-store")]
use crate::store::memcached::MemcachedStore;
#[cfg(feature = "mysql-store")]
use crate::store::mysql::MySqlStore;
#[cfg(feature = "redis-store")]
use crate::store::redis::RedisStore;

/// A store chosen at runtime, typically from
/// [`SessionConfig::backend`](crate::SessionConfig).
#[derive(Clone, Debug)]
pub enum AnyStore {
    File(FileStore),
    Cookie(CookieStore),
    Memory(MemoryStore),
    #[cfg(feature = "mysql-store")]
    MySql(MySqlStore),
    #[cfg(feature = "redis-store")]
    Redis(RedisStore<fred::clients::Client>),
    #[cfg(feature = "memcached-store")]
    Memcached(MemcachedStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::File($store) => $call,
            AnyStore::Cookie($store) => $call,
            AnyStore::Memory($store) => $call,
            #[cfg(feature = "mysql-store")]
            AnyStore::MySql($store) => $call,
            #[cfg(feature = "redis-store")]
            AnyStore::Redis($store) => $call,
            #[cfg(feature = "memcached-store")]
            AnyStore::Memcached($store) => $call,
        }
    };
}

impl AnyStore {
    /// The backend name, as accepted by [`Backend::from_str`](crate::Backend).
    pub fn name(&self) -> &'static str {
        match self {
            AnyStore::File(_) => "File",
            AnyStore::Cookie(_) => "Cookie",
            AnyStore::Memory(_) => "Memory",
            #[cfg(feature = "mysql-store")]
            AnyStore::MySql(_) => "MySql",
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(_) => "Redis",
            #[cfg(feature = "memcached-store")]
            AnyStore::Memcached(_) => "Memcached",
        }
    }
}

impl SessionStore for AnyStore {
    async fn open(&mut self, cx: &OpenContext) -> Result<(), Error> {
        dispatch!(self, store => store.open(cx).await)
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        dispatch!(self, store => store.get(session_id).await)
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        dispatch!(self, store => store.set(session_id, payload, ttl_secs).await)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        dispatch!(self, store => store.touch(session_id, ttl_secs).await)
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        dispatch!(self, store => store.delete(session_id).await)
    }

    async fn gc(&mut self, max_lifetime_secs: i64) -> Result<u64, Error> {
        dispatch!(self, store => store.gc(max_lifetime_secs).await)
    }

    async fn close(&mut self) -> Result<(), Error> {
        dispatch!(self, store => store.close().await)
    }
}

impl From<FileStore> for AnyStore {
    fn from(store: FileStore) -> Self {
        AnyStore::File(store)
    }
}

impl From<CookieStore> for AnyStore {
    fn from(store: CookieStore) -> Self {
        AnyStore::Cookie(store)
    }
}

impl From<MemoryStore> for AnyStore {
    fn from(store: MemoryStore) -> Self {
        AnyStore::Memory(store)
    }
}
