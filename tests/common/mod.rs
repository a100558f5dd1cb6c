#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use seshat::store::memory::MemoryStore;
use seshat::store::{Error, OpenContext, SessionStore};
use seshat::{AesGcmCipher, Cipher, CookieOptions, Id};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub(crate) struct TestUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub(crate) struct TestPreferences {
    pub theme: String,
    pub language: String,
}

pub(crate) fn test_user() -> TestUser {
    TestUser {
        id: 1,
        name: "Test User".to_string(),
    }
}

pub(crate) fn test_preferences() -> TestPreferences {
    TestPreferences {
        theme: "dark".to_string(),
        language: "en".to_string(),
    }
}

pub fn build_cookie_options() -> CookieOptions {
    CookieOptions::build()
        .name("test_sess")
        .http_only(true)
        .same_site(cookie::SameSite::Lax)
        .secure(true)
        .max_age(15)
        .path("/")
}

pub fn test_cipher() -> Arc<dyn Cipher> {
    Arc::new(AesGcmCipher::from_passphrase("integration tests").unwrap())
}

/// A memory store that records the name of every call it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Calls other than `open` and `close`.
    pub fn data_calls(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(*call, "open" | "close"))
            .collect()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

impl SessionStore for RecordingStore {
    async fn open(&mut self, cx: &OpenContext) -> Result<(), Error> {
        self.record("open");
        self.inner.open(cx).await
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        self.record("get");
        self.inner.get(session_id).await
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        self.record("set");
        self.inner.set(session_id, payload, ttl_secs).await
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        self.record("touch");
        self.inner.touch(session_id, ttl_secs).await
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        self.record("delete");
        self.inner.delete(session_id).await
    }

    async fn gc(&mut self, max_lifetime_secs: i64) -> Result<u64, Error> {
        self.record("gc");
        self.inner.gc(max_lifetime_secs).await
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.record("close");
        self.inner.close().await
    }
}

pub const BACKEND_FAULT: &str = "Connection refused (os error 111)";

/// A store whose data operations always fail with [`BACKEND_FAULT`].
#[derive(Clone, Debug, Default)]
pub struct FailingStore;

fn fault<T>() -> Result<T, Error> {
    Err(Error::Backend(BACKEND_FAULT.to_string()))
}

impl SessionStore for FailingStore {
    async fn open(&mut self, _cx: &OpenContext) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&mut self, _session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        fault()
    }

    async fn set(&mut self, _session_id: &Id, _payload: &[u8], _ttl_secs: i64) -> Result<bool, Error> {
        fault()
    }

    async fn touch(&mut self, _session_id: &Id, _ttl_secs: i64) -> Result<bool, Error> {
        fault()
    }

    async fn delete(&mut self, _session_id: &Id) -> Result<bool, Error> {
        fault()
    }

    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        fault()
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Joins the `name=value` pairs of every `Set-Cookie` header into a `Cookie`
/// request header, skipping removals.
pub fn cookie_header(response: &http::Response<axum::body::Body>) -> String {
    response
        .headers()
        .get_all(http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| !value.contains("Max-Age=0"))
        .filter_map(|value| value.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}
