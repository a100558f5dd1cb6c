//! The per-request session lifecycle.
//!
//! [`SessionHandler`] implements the hosting-runtime contract
//! (`open`, `validate_id`, `create_sid`, `read`, `write`, `update_timestamp`,
//! `destroy`, `gc`, `close`) on top of any [`SessionStore`], sealing payloads
//! with a [`Cipher`] on the way in and out.

use std::path::Path;
use std::sync::Arc;

use tower_cookies::Cookies;

use crate::cipher::{self, Cipher};
use crate::store::{self, OpenContext, SessionStore};
use crate::{CookieOptions, Id};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] store::Error),

    #[error(transparent)]
    Cipher(#[from] cipher::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// What happens when a backend call fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the fault, print its message to stderr and exit the process.
    Abort,
    /// Return the fault to the caller; the request fails.
    #[default]
    Propagate,
}

/// Validation state of the session id presented by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Gate {
    /// No id has been validated yet.
    #[default]
    Unverified,
    /// The id maps to a stored record.
    Validated,
    /// The id is unknown; every further operation is a no-op.
    Rejected,
}

/// Settings shared by every handler built from one configuration.
#[derive(Clone, Debug)]
pub struct HandlerOptions {
    /// Session lifetime in seconds, used as the TTL of every write.
    /// Values below 1 are treated as 1.
    pub max_lifetime: i64,
    /// Reject unknown ids instead of passing every call to the backend.
    pub spam_gate: bool,
    /// Chance, from `0.0` to `1.0`, that a request purges expired records.
    pub gc_probability: f64,
    pub failure_policy: FailurePolicy,
    pub cookie_options: CookieOptions,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            max_lifetime: 1440,
            spam_gate: false,
            gc_probability: 0.01,
            failure_policy: FailurePolicy::default(),
            cookie_options: CookieOptions::default(),
        }
    }
}

/// Drives one request's session through a [`SessionStore`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use seshat::{AesGcmCipher, HandlerOptions, SessionHandler};
/// use seshat::store::memory::MemoryStore;
///
/// # async fn run() -> Result<(), seshat::HandlerError> {
/// let cipher = Arc::new(AesGcmCipher::from_passphrase("secret").unwrap());
/// let mut handler = SessionHandler::new(MemoryStore::new(), cipher, Arc::new(HandlerOptions::default()));
///
/// handler.open(None, "SESSID").await?;
/// let id = handler.create_sid().unwrap();
/// handler.write(&id, b"user_id=42").await?;
/// assert_eq!(handler.read(&id).await?, b"user_id=42");
/// handler.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionHandler<S: SessionStore> {
    store: S,
    cipher: Arc<dyn Cipher>,
    options: Arc<HandlerOptions>,
    cookies: Option<Cookies>,
    gate: Gate,
    // decrypted payload of the record last validated, read or written
    loaded: Option<(Id, Vec<u8>)>,
}

impl<S: SessionStore> std::fmt::Debug for SessionHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("options", &self.options)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<S: SessionStore> SessionHandler<S> {
    pub fn new(store: S, cipher: Arc<dyn Cipher>, options: Arc<HandlerOptions>) -> Self {
        Self {
            store,
            cipher,
            options,
            cookies: None,
            gate: Gate::Unverified,
            loaded: None,
        }
    }

    /// Attaches the request's cookie jar, used to clear the session cookie
    /// and by cookie-backed stores.
    pub fn with_cookies(mut self, cookies: Cookies) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Acquires the backend handle.
    #[tracing::instrument(name = "opening session", skip(self, save_path))]
    pub async fn open(&mut self, save_path: Option<&Path>, name: &str) -> Result<bool> {
        let mut cx = OpenContext::new(name);
        cx.save_path = save_path.map(Path::to_path_buf);
        cx.cookies = self.cookies.clone();

        let opened = self.store.open(&cx).await;
        self.check(opened)?;
        Ok(true)
    }

    /// Looks `session_id` up and moves the gate out of `Unverified`.
    ///
    /// Returns `true` if a record exists. With the spam gate enabled an
    /// unknown id is rejected, otherwise the gate stays `Unverified`.
    #[tracing::instrument(name = "validating session id", skip(self, session_id))]
    pub async fn validate_id(&mut self, session_id: &Id) -> Result<bool> {
        match self.fetch(session_id).await? {
            Some(data) => {
                self.loaded = Some((*session_id, data));
                self.gate = Gate::Validated;
                Ok(true)
            }
            None => {
                self.reject();
                Ok(false)
            }
        }
    }

    /// Marks the presented id as unrecognized without a backend lookup, e.g.
    /// because it could not be parsed.
    pub fn reject(&mut self) {
        self.loaded = None;
        if self.options.spam_gate {
            tracing::debug!("rejecting unrecognized session id");
            self.gate = Gate::Rejected;
        }
    }

    /// A fresh session id, or `None` once the presented id was rejected.
    pub fn create_sid(&self) -> Option<Id> {
        if self.gate == Gate::Rejected {
            tracing::debug!("rejected session: not issuing a new id");
            return None;
        }

        Some(Id::generate())
    }

    /// Returns the decrypted payload of `session_id`, or an empty payload
    /// when there is no (readable) record.
    #[tracing::instrument(name = "reading session", skip(self, session_id))]
    pub async fn read(&mut self, session_id: &Id) -> Result<Vec<u8>> {
        if self.gate == Gate::Rejected {
            return Ok(Vec::new());
        }

        if let Some(data) = self.loaded_for(session_id) {
            return Ok(data.to_vec());
        }

        let data = self.fetch(session_id).await?.unwrap_or_default();
        self.loaded = Some((*session_id, data.clone()));
        Ok(data)
    }

    /// Seals and stores `data` with the configured lifetime.
    ///
    /// Writing an empty payload over a session that was empty is a no-op.
    #[tracing::instrument(name = "writing session", skip(self, session_id, data))]
    pub async fn write(&mut self, session_id: &Id, data: &[u8]) -> Result<bool> {
        if self.gate == Gate::Rejected || self.is_noop_write(session_id, data) {
            tracing::debug!("skipping session write");
            return Ok(true);
        }

        let sealed = self.cipher.encrypt(data, session_id.as_bytes())?;
        let stored = self.store.set(session_id, &sealed, self.ttl()).await;
        let stored = self.check(stored)?;

        self.loaded = Some((*session_id, data.to_vec()));
        Ok(stored)
    }

    /// Extends the lifetime of an unchanged session.
    #[tracing::instrument(name = "updating session timestamp", skip(self, session_id, data))]
    pub async fn update_timestamp(&mut self, session_id: &Id, data: &[u8]) -> Result<bool> {
        if self.gate == Gate::Rejected || self.is_noop_write(session_id, data) {
            return Ok(true);
        }

        let touched = self.store.touch(session_id, self.ttl()).await;
        if self.check(touched)? {
            return Ok(true);
        }

        // the record vanished in the meantime
        self.write(session_id, data).await
    }

    /// Deletes the record and clears the session cookie.
    ///
    /// Returns `true` if a record was removed.
    #[tracing::instrument(name = "destroying session", skip(self, session_id))]
    pub async fn destroy(&mut self, session_id: &Id) -> Result<bool> {
        self.clear_cookie();
        self.loaded = None;

        if self.gate == Gate::Rejected {
            return Ok(true);
        }

        let deleted = self.store.delete(session_id).await;
        self.check(deleted)
    }

    /// Purges expired records, returning how many were removed.
    #[tracing::instrument(name = "collecting expired sessions", skip(self))]
    pub async fn gc(&mut self, max_lifetime: i64) -> Result<u64> {
        if self.gate == Gate::Rejected {
            return Ok(0);
        }

        let collected = self.store.gc(max_lifetime).await;
        self.check(collected)
    }

    /// Runs [`gc`](Self::gc) with the configured probability.
    ///
    /// Returns `None` when this request was not picked.
    pub async fn gc_if_due(&mut self) -> Result<Option<u64>> {
        let probability = self.options.gc_probability;
        if probability.is_nan() || probability <= 0.0 || !rand::random_bool(probability.min(1.0)) {
            return Ok(None);
        }

        let max_lifetime = self.ttl();
        self.gc(max_lifetime).await.map(Some)
    }

    /// Releases the backend handle and resets the per-request state.
    #[tracing::instrument(name = "closing session", skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        if self.gate == Gate::Rejected {
            self.clear_cookie();
        }

        self.gate = Gate::Unverified;
        self.loaded = None;

        let closed = self.store.close().await;
        self.check(closed)
    }

    async fn fetch(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>> {
        let sealed = self.store.get(session_id).await;
        let Some(sealed) = self.check(sealed)? else {
            return Ok(None);
        };

        match self.cipher.decrypt(&sealed, session_id.as_bytes()) {
            Ok(data) => Ok(Some(data)),
            Err(err) => {
                tracing::warn!(err = %err, "undecryptable session payload, treating as missing");
                Ok(None)
            }
        }
    }

    fn ttl(&self) -> i64 {
        self.options.max_lifetime.max(1)
    }

    fn loaded_for(&self, session_id: &Id) -> Option<&[u8]> {
        self.loaded
            .as_ref()
            .filter(|(id, _)| id == session_id)
            .map(|(_, data)| data.as_slice())
    }

    fn is_noop_write(&self, session_id: &Id, data: &[u8]) -> bool {
        data.is_empty() && self.loaded_for(session_id).is_none_or(<[u8]>::is_empty)
    }

    fn clear_cookie(&self) {
        if let Some(cookies) = &self.cookies {
            let options = &self.options.cookie_options;
            cookies.remove(options.removal(options.name));
        }
    }

    fn check<T>(&self, result: std::result::Result<T, store::Error>) -> Result<T> {
        result.map_err(|err| {
            tracing::error!(err = %err, "session backend fault");
            if self.options.failure_policy == FailurePolicy::Abort {
                abort(&err);
            }
            err.into()
        })
    }
}

fn abort(err: &store::Error) -> ! {
    eprintln!("{err}");
    std::process::exit(1)
}
