//! Backend selection and runtime configuration.

use std::env;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::cipher::{self, AesGcmCipher, Cipher};
use crate::handler::{FailurePolicy, HandlerOptions};
use crate::store::cookie::CookieStore;
use crate::store::file::FileStore;
use crate::store::memory::MemoryStore;
use crate::store::{self, AnyStore};
use crate::CookieOptions;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown session backend `{0}`")]
    UnknownBackend(String),

    #[error("no encryption key configured")]
    MissingKey,

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("the {0} backend requires the `{1}` feature")]
    FeatureDisabled(Backend, &'static str),

    #[error(transparent)]
    Cipher(#[from] cipher::Error),

    #[error(transparent)]
    Store(#[from] store::Error),
}

/// The storage backends a [`SessionConfig`] can select by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    File,
    MySql,
    Redis,
    Memcached,
    Cookie,
    Memory,
}

impl Backend {
    fn default_port(self) -> Option<u16> {
        match self {
            Backend::MySql => Some(3306),
            Backend::Redis => Some(6379),
            Backend::Memcached => Some(11211),
            _ => None,
        }
    }

    /// Redis and Memcached reject unknown ids by default.
    fn default_spam_gate(self) -> bool {
        matches!(self, Backend::Redis | Backend::Memcached)
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::File => "File",
            Backend::MySql => "MySql",
            Backend::Redis => "Redis",
            Backend::Memcached => "Memcached",
            Backend::Cookie => "Cookie",
            Backend::Memory => "Memory",
        })
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "mysql" => Ok(Backend::MySql),
            "redis" => Ok(Backend::Redis),
            "memcached" | "memcache" => Ok(Backend::Memcached),
            "cookie" => Ok(Backend::Cookie),
            "memory" => Ok(Backend::Memory),
            _ => Err(Error::UnknownBackend(s.to_string())),
        }
    }
}

/// Everything needed to build a store, a cipher and the handler options.
///
/// # Example
///
/// ```rust
/// use seshat::{Backend, SessionConfig};
///
/// let config = SessionConfig::new(Backend::Redis)
///     .hostname("cache.internal")
///     .database(2)
///     .max_lifetime(30 * 60)
///     .key("a long random passphrase");
///
/// assert_eq!(config.port_or_default(), Some(6379));
/// assert!(config.spam_gate_enabled());
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    pub backend: Backend,
    pub hostname: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Redis database index or MySQL schema name.
    pub database: Option<String>,
    /// Directory of the file backend.
    pub save_path: PathBuf,
    /// MySQL table name.
    pub table_name: String,
    /// Key prefix of the Redis and Memcached backends.
    pub namespace: String,
    pub max_lifetime: i64,
    /// Chance between 0.0 and 1.0 that a request purges expired records.
    pub gc_probability: f64,
    pub key: Option<String>,
    pub spam_gate: Option<bool>,
    pub failure_policy: FailurePolicy,
    pub cookie_options: CookieOptions,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("backend", &self.backend)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("save_path", &self.save_path)
            .field("max_lifetime", &self.max_lifetime)
            .field("gc_probability", &self.gc_probability)
            .field("spam_gate", &self.spam_gate)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            hostname: "127.0.0.1".to_string(),
            port: None,
            username: None,
            password: None,
            database: None,
            save_path: env::temp_dir().join("seshat"),
            table_name: "sessions".to_string(),
            namespace: "session:".to_string(),
            max_lifetime: 1440,
            gc_probability: 0.01,
            key: None,
            spam_gate: None,
            failure_policy: FailurePolicy::default(),
            cookie_options: CookieOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Reads the configuration from `SESSION_*` environment variables.
    ///
    /// `SESSION_BACKEND` selects the backend (default `File`); the others
    /// are `SESSION_HOST`, `SESSION_PORT`, `SESSION_USERNAME`,
    /// `SESSION_PASSWORD`, `SESSION_DATABASE`, `SESSION_SAVE_PATH`,
    /// `SESSION_MAX_LIFETIME`, `SESSION_GC_PROBABILITY` and `SESSION_KEY`.
    /// A lifetime below one second is rejected.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let backend = match lookup("SESSION_BACKEND") {
            Some(name) => name.parse()?,
            None => Backend::default(),
        };
        let mut config = Self::new(backend);

        if let Some(hostname) = lookup("SESSION_HOST") {
            config.hostname = hostname;
        }
        if let Some(port) = lookup("SESSION_PORT") {
            config.port = Some(port.parse().map_err(|err: std::num::ParseIntError| {
                Error::Invalid {
                    name: "SESSION_PORT",
                    reason: err.to_string(),
                }
            })?);
        }
        if let Some(max_lifetime) = lookup("SESSION_MAX_LIFETIME") {
            config.max_lifetime = max_lifetime.parse().map_err(|err: std::num::ParseIntError| {
                Error::Invalid {
                    name: "SESSION_MAX_LIFETIME",
                    reason: err.to_string(),
                }
            })?;
            check_max_lifetime("SESSION_MAX_LIFETIME", config.max_lifetime)?;
        }
        if let Some(probability) = lookup("SESSION_GC_PROBABILITY") {
            config.gc_probability = probability.parse().map_err(|err: std::num::ParseFloatError| {
                Error::Invalid {
                    name: "SESSION_GC_PROBABILITY",
                    reason: err.to_string(),
                }
            })?;
            check_gc_probability("SESSION_GC_PROBABILITY", config.gc_probability)?;
        }
        if let Some(save_path) = lookup("SESSION_SAVE_PATH") {
            config.save_path = save_path.into();
        }
        config.username = lookup("SESSION_USERNAME");
        config.password = lookup("SESSION_PASSWORD");
        config.database = lookup("SESSION_DATABASE");
        config.key = lookup("SESSION_KEY");

        Ok(config)
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl ToString) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = save_path.into();
        self
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Session lifetime in seconds. Defaults to 1440.
    pub fn max_lifetime(mut self, seconds: i64) -> Self {
        self.max_lifetime = seconds;
        self
    }

    /// Chance that a request purges expired records. Defaults to 0.01.
    pub fn gc_probability(mut self, probability: f64) -> Self {
        self.gc_probability = probability;
        self
    }

    /// Passphrase the encryption key is derived from.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Overrides the backend's default for the spam gate.
    pub fn spam_gate(mut self, enabled: bool) -> Self {
        self.spam_gate = Some(enabled);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or(self.backend.default_port())
    }

    pub fn spam_gate_enabled(&self) -> bool {
        self.spam_gate.unwrap_or(self.backend.default_spam_gate())
    }

    /// Fails when the lifetime is below one second or the gc probability
    /// lies outside 0.0..=1.0.
    pub fn handler_options(&self) -> Result<HandlerOptions, Error> {
        check_max_lifetime("max_lifetime", self.max_lifetime)?;
        check_gc_probability("gc_probability", self.gc_probability)?;
        Ok(HandlerOptions {
            max_lifetime: self.max_lifetime,
            gc_probability: self.gc_probability,
            spam_gate: self.spam_gate_enabled(),
            failure_policy: self.failure_policy,
            cookie_options: self.cookie_options,
        })
    }

    /// Builds the payload cipher from the configured key.
    pub fn cipher(&self) -> Result<Arc<dyn Cipher>, Error> {
        let key = self.key.as_deref().ok_or(Error::MissingKey)?;
        Ok(Arc::new(AesGcmCipher::from_passphrase(key)?))
    }

    /// Builds (and, for network backends, connects) the configured store.
    #[tracing::instrument(name = "initializing session store", skip(self), fields(backend = %self.backend))]
    pub async fn store(&self) -> Result<AnyStore, Error> {
        let store = match self.backend {
            Backend::File => FileStore::new(&self.save_path).into(),
            Backend::Cookie => CookieStore::new(self.cookie_options).into(),
            Backend::Memory => MemoryStore::new().into(),
            Backend::MySql => self.mysql_store().await?,
            Backend::Redis => self.redis_store().await?,
            Backend::Memcached => self.memcached_store()?,
        };

        Ok(store)
    }

    #[cfg(feature = "mysql-store")]
    async fn mysql_store(&self) -> Result<AnyStore, Error> {
        use crate::store::mysql::{MySqlOptions, MySqlStoreBuilder};

        let options = MySqlOptions {
            hostname: self.hostname.clone(),
            port: self.port_or_default().unwrap_or(3306),
            username: self.username.clone().unwrap_or_else(|| "root".to_string()),
            password: self.password.clone(),
            database: self.database.clone().unwrap_or_else(|| "sessions".to_string()),
        };

        let pool = options.connect().await?;
        let store = MySqlStoreBuilder::new(pool, true)
            .table_name(self.table_name.clone())
            .build()
            .await?;
        Ok(AnyStore::MySql(store))
    }

    #[cfg(not(feature = "mysql-store"))]
    async fn mysql_store(&self) -> Result<AnyStore, Error> {
        Err(Error::FeatureDisabled(Backend::MySql, "mysql-store"))
    }

    #[cfg(feature = "redis-store")]
    async fn redis_store(&self) -> Result<AnyStore, Error> {
        use crate::store::redis::{RedisOptions, RedisStore};

        let database = self
            .database
            .as_deref()
            .map(str::parse::<u8>)
            .transpose()
            .map_err(|err| Error::Invalid {
                name: "database",
                reason: err.to_string(),
            })?;
        let options = RedisOptions {
            hostname: self.hostname.clone(),
            port: self.port_or_default().unwrap_or(6379),
            username: self.username.clone(),
            password: self.password.clone(),
            database,
        };

        let store = RedisStore::connect(&options).await?.namespace(self.namespace.clone());
        Ok(AnyStore::Redis(store))
    }

    #[cfg(not(feature = "redis-store"))]
    async fn redis_store(&self) -> Result<AnyStore, Error> {
        Err(Error::FeatureDisabled(Backend::Redis, "redis-store"))
    }

    #[cfg(feature = "memcached-store")]
    fn memcached_store(&self) -> Result<AnyStore, Error> {
        use crate::store::memcached::MemcachedStore;

        let port = self.port_or_default().unwrap_or(11211);
        let store = MemcachedStore::from_host(&self.hostname, port).namespace(self.namespace.clone());
        Ok(AnyStore::Memcached(store))
    }

    #[cfg(not(feature = "memcached-store"))]
    fn memcached_store(&self) -> Result<AnyStore, Error> {
        Err(Error::FeatureDisabled(Backend::Memcached, "memcached-store"))
    }
}

fn check_max_lifetime(name: &'static str, seconds: i64) -> Result<(), Error> {
    if seconds < 1 {
        return Err(Error::Invalid {
            name,
            reason: format!("{seconds} is below one second"),
        });
    }
    Ok(())
}

fn check_gc_probability(name: &'static str, probability: f64) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(Error::Invalid {
            name,
            reason: format!("{probability} is outside 0.0..=1.0"),
        });
    }
    Ok(())
}
