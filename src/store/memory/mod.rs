use crate::Id;
use crate::store::{Error, OpenContext, SessionStore};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|expires| expires > now).unwrap_or(true)
    }
}

fn expires_at(ttl_secs: i64) -> Option<Instant> {
    if ttl_secs > 0 {
        Some(Instant::now() + Duration::from_secs(ttl_secs as u64))
    } else {
        None
    }
}

/// An in-memory session store implementation.
///
/// Clones share the same map, so a store handed to the
/// [`SessionLayer`](crate::SessionLayer) sees every request's writes.
///
/// ### Note
///
/// Do not use this in a production environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<Id, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|entry| entry.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    async fn open(&mut self, _cx: &OpenContext) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        let now = Instant::now();
        let value = self
            .data
            .get(session_id)
            .filter(|value| value.is_live(now))
            .map(|value| value.data.clone());

        Ok(value)
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        self.data.insert(
            *session_id,
            StoredValue {
                data: payload.to_vec(),
                expires_at: expires_at(ttl_secs),
            },
        );

        Ok(true)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        let now = Instant::now();
        match self.data.get_mut(session_id) {
            Some(mut value) if value.is_live(now) => {
                value.expires_at = expires_at(ttl_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        Ok(self.data.remove(session_id).is_some())
    }

    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, value| value.is_live(now));
        Ok(before.saturating_sub(self.data.len()) as u64)
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
