//! Client-side session storage: the encrypted payload travels in a cookie.

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use tower_cookies::Cookies;

use crate::store::{Error, OpenContext, SessionStore};
use crate::{CookieOptions, Id};

/// Browsers reject cookies larger than this.
pub const MAX_COOKIE_SIZE: usize = 4096;

/// A store that keeps the payload in a `<name>_data` cookie.
///
/// The id is irrelevant to where the data lives, but it is still issued so
/// the lifecycle is identical to the server-side stores. Since the payload
/// is sealed by the handler's cipher before it reaches this store, clients
/// can neither read nor forge it.
#[derive(Clone)]
pub struct CookieStore {
    options: CookieOptions,
    cookie_name: Option<String>,
    cookies: Option<Cookies>,
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("options", &self.options)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new(CookieOptions::default())
    }
}

impl CookieStore {
    /// Creates a store whose data cookie uses the attributes of `options`.
    pub fn new(options: CookieOptions) -> Self {
        Self {
            options,
            cookie_name: None,
            cookies: None,
        }
    }

    fn jar(&self) -> Result<(&Cookies, &str), Error> {
        match (&self.cookies, &self.cookie_name) {
            (Some(cookies), Some(name)) => Ok((cookies, name)),
            _ => Err(Error::Connection(
                "cookie store used without a cookie jar; is CookieManagerLayer installed?".to_string(),
            )),
        }
    }

    fn store_cookie(&self, value: String, ttl_secs: i64) -> Result<(), Error> {
        let (cookies, name) = self.jar()?;
        let options = self.options.max_age(ttl_secs);
        let cookie = options.cookie(name.to_string(), value);

        let size = cookie.name().len() + cookie.value().len();
        if size > MAX_COOKIE_SIZE {
            return Err(Error::Backend(format!(
                "session payload of {size} bytes exceeds the {MAX_COOKIE_SIZE} byte cookie limit"
            )));
        }

        cookies.add(cookie);
        Ok(())
    }
}

impl SessionStore for CookieStore {
    async fn open(&mut self, cx: &OpenContext) -> Result<(), Error> {
        self.cookie_name = Some(format!("{}_data", cx.name));
        self.cookies = cx.cookies.clone();
        self.jar()?;
        Ok(())
    }

    async fn get(&mut self, _session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        let (cookies, name) = self.jar()?;
        let Some(cookie) = cookies.get(name) else {
            return Ok(None);
        };

        match BASE64_URL_SAFE_NO_PAD.decode(cookie.value()) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) => {
                tracing::warn!(err = %err, "possibly suspicious activity: malformed session cookie");
                Ok(None)
            }
        }
    }

    async fn set(&mut self, _session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        self.store_cookie(BASE64_URL_SAFE_NO_PAD.encode(payload), ttl_secs)?;
        Ok(true)
    }

    async fn touch(&mut self, _session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        let (cookies, name) = self.jar()?;
        let Some(cookie) = cookies.get(name) else {
            return Ok(false);
        };

        self.store_cookie(cookie.value().to_string(), ttl_secs)?;
        Ok(true)
    }

    async fn delete(&mut self, _session_id: &Id) -> Result<bool, Error> {
        let (cookies, name) = self.jar()?;
        let existed = cookies.get(name).is_some();
        cookies.remove(self.options.removal(name.to_string()));
        Ok(existed)
    }

    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        Ok(0)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.cookies = None;
        Ok(())
    }
}
