//! The request-scoped session exposed to application code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

mod cookie_options;
mod data;
mod id;

pub use cookie_options::CookieOptions;
pub use data::SessionData;
pub use id::Id;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),
}

type Result<T> = std::result::Result<T, Error>;

/// A session loaded for the duration of one request.
///
/// Reads and writes only touch the in-memory [`SessionData`]. The
/// [`SessionLayer`](crate::SessionLayer) persists the changes through the
/// configured store once the inner service has produced its response.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a new `Session` instance.
    pub fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Returns the session ID, if the client presented a recognized one or a
    /// new one has been issued.
    pub fn id(&self) -> Option<Id> {
        *self.inner.id.read()
    }

    /// Retrieves and deserializes `field`.
    pub fn get<T>(&self, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.inner.data.read().get(field)
    }

    /// Sets `field` to `value`.
    ///
    /// Returns `true` if the stored value changed.
    #[tracing::instrument(name = "inserting session field", skip(self, value))]
    pub fn insert<T>(&self, field: &str, value: &T) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let changed = self.inner.data.write().insert(field, value).map_err(|err| {
            tracing::error!(err = %err, "failed to serialize session field");
            err
        })?;

        if changed {
            self.inner.changed();
        }

        Ok(changed)
    }

    /// Removes `field`. Returns `true` if it was present.
    pub fn remove(&self, field: &str) -> bool {
        let removed = self.inner.data.write().remove(field);
        if removed {
            self.inner.changed();
        }
        removed
    }

    /// Removes every field while keeping the session itself.
    pub fn clear(&self) -> bool {
        let cleared = self.inner.data.write().clear();
        if cleared {
            self.inner.changed();
        }
        cleared
    }

    /// Marks the session for destruction: the record is deleted and the
    /// session cookie removed when the request completes.
    pub fn destroy(&self) {
        self.inner.data.write().clear();
        self.inner.deleted.store(true, Ordering::Relaxed);
    }

    /// Requests a fresh session id. The data moves to the new id and the old
    /// record is deleted when the request completes.
    pub fn regenerate(&self) {
        self.inner.regenerate.store(true, Ordering::Relaxed);
        self.inner.changed();
    }

    pub fn contains(&self, field: &str) -> bool {
        self.inner.data.read().contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Inner {
    pub id: RwLock<Option<Id>>,
    pub data: RwLock<SessionData>,
    // set when a field is inserted, removed or the id is regenerated
    pub changed: AtomicBool,
    // set when the session is destroyed
    pub deleted: AtomicBool,
    pub regenerate: AtomicBool,
}

impl Inner {
    pub fn new(id: Option<Id>, data: SessionData) -> Self {
        Self {
            id: RwLock::new(id),
            data: RwLock::new(data),
            ..Default::default()
        }
    }

    fn changed(&self) {
        self.changed.store(true, Ordering::Relaxed);
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Relaxed)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Relaxed)
    }

    pub fn wants_regeneration(&self) -> bool {
        self.regenerate.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Arc::new(Inner::new(None, SessionData::default())))
    }

    #[test]
    fn tracks_changes() {
        let session = session();
        assert!(!session.inner.is_changed());

        session.insert("count", &1_i32).unwrap();
        assert!(session.inner.is_changed());
        assert_eq!(session.get::<i32>("count").unwrap(), Some(1));
    }

    #[test]
    fn unchanged_insert_does_not_mark_session() {
        let mut data = SessionData::default();
        data.insert("count", &1_i32).unwrap();
        let session = Session::new(Arc::new(Inner::new(Some(Id::generate()), data)));

        assert!(!session.insert("count", &1_i32).unwrap());
        assert!(!session.inner.is_changed());
        assert!(!session.remove("missing"));
        assert!(!session.inner.is_changed());
    }

    #[test]
    fn destroy_clears_data() {
        let session = session();
        session.insert("user", "alice").unwrap();
        session.destroy();

        assert!(session.inner.is_deleted());
        assert!(session.is_empty());
    }
}
