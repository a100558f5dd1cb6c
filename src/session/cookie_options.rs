use cookie::time::Duration;
use cookie::{Cookie, SameSite};

/// Configuration options for the session-id cookie.
///
/// # Example
///
/// ```rust
/// use seshat::CookieOptions;
///
/// let cookie_options = CookieOptions::build()
///         .name("test_sess")
///         .http_only(true)
///         .same_site(cookie::SameSite::Lax)
///         .secure(true)
///         .max_age(30 * 60)
///         .path("/");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct CookieOptions {
    pub http_only: bool,
    pub name: &'static str,
    pub domain: Option<&'static str>,
    pub path: Option<&'static str>,
    pub same_site: SameSite,
    pub secure: bool,
    /// Cookie lifetime in seconds. `0` issues a browser-session cookie.
    pub max_age: i64,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            name: "SESSID",
            domain: None,
            path: Some("/"),
            same_site: SameSite::Lax,
            secure: true,
            max_age: 0,
        }
    }
}

impl CookieOptions {
    /// Creates a new `CookieOptions` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    /// Sets the name of the cookie.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn domain(mut self, domain: &'static str) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn path(mut self, path: &'static str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Builds a cookie named `name` carrying `value` with these attributes.
    pub(crate) fn cookie(&self, name: impl Into<String>, value: impl Into<String>) -> Cookie<'static> {
        let mut builder = Cookie::build((name.into(), value.into()))
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site);

        if self.max_age > 0 {
            builder = builder.max_age(Duration::seconds(self.max_age));
        }
        if let Some(domain) = self.domain {
            builder = builder.domain(domain);
        }
        if let Some(path) = self.path {
            builder = builder.path(path);
        }

        builder.build()
    }

    /// A cookie that, once removed from the jar, expires `name` on the client.
    pub(crate) fn removal(&self, name: impl Into<String>) -> Cookie<'static> {
        let mut builder = Cookie::build(name.into());
        if let Some(domain) = self.domain {
            builder = builder.domain(domain);
        }
        if let Some(path) = self.path {
            builder = builder.path(path);
        }
        builder.build()
    }
}
