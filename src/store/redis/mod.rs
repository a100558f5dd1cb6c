use crate::Id;
use crate::store::{Error, OpenContext, SessionStore};
use fred::clients::{Client, Pool};
use fred::interfaces::{ClientLike, KeysInterface};
use fred::types::config::{Config, ServerConfig};
use fred::types::{Expiration, Value};
use std::sync::Arc;

/// Connection parameters for [`RedisStore::connect`].
#[derive(Clone, Debug)]
pub struct RedisOptions {
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<u8>,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: None,
        }
    }
}

impl From<&RedisOptions> for Config {
    fn from(options: &RedisOptions) -> Self {
        Config {
            server: ServerConfig::new_centralized(options.hostname.as_str(), options.port),
            username: options.username.clone(),
            password: options.password.clone(),
            database: options.database,
            ..Default::default()
        }
    }
}

/// A redis session store implementation.
///
/// Each session is a plain string key `<namespace><id>` holding the
/// encrypted payload, with Redis' own TTL as the session expiry.
#[derive(Clone)]
pub struct RedisStore<C: KeysInterface + Clone + Send + Sync = Pool> {
    client: Arc<C>,
    namespace: String,
}

impl<C> std::fmt::Debug for RedisStore<C>
where
    C: KeysInterface + Clone + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<C> RedisStore<C>
where
    C: KeysInterface + Clone + Send + Sync,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            namespace: "session:".to_string(),
        }
    }

    /// Sets the key prefix. Defaults to `session:`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, session_id: &Id) -> String {
        format!("{}{}", self.namespace, session_id)
    }
}

impl RedisStore<Client> {
    /// Builds a client from `options`, selects the configured database and
    /// waits for the connection.
    #[tracing::instrument(name = "connecting to redis", skip(options), fields(host = %options.hostname, port = options.port))]
    pub async fn connect(options: &RedisOptions) -> Result<Self, Error> {
        let client = Client::new(options.into(), None, None, None);
        client.connect();
        client.wait_for_connect().await.map_err(|err| {
            tracing::error!(err = %err, "failed to connect to redis");
            Error::Connection(err.to_string())
        })?;

        Ok(Self::new(Arc::new(client)))
    }
}

impl<C> SessionStore for RedisStore<C>
where
    C: KeysInterface + Clone + Send + Sync + 'static,
{
    async fn open(&mut self, _cx: &OpenContext) -> Result<(), Error> {
        Ok(())
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .client
            .get::<Option<Vec<u8>>, _>(self.key(session_id))
            .await?)
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        let expiration = (ttl_secs > 0).then_some(Expiration::EX(ttl_secs));
        let _: () = self
            .client
            .set(self.key(session_id), Value::from(payload), expiration, None, false)
            .await?;

        Ok(true)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        Ok(self.client.expire(self.key(session_id), ttl_secs, None).await?)
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        let deleted: i64 = self.client.del(self.key(session_id)).await?;
        Ok(deleted > 0)
    }

    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        Ok(0)
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let store = RedisStore::new(Arc::new(Client::default())).namespace("app:sess:");
        let session_id = Id::generate();
        assert_eq!(store.key(&session_id), format!("app:sess:{session_id}"));
    }

    #[test]
    fn test_options_map_to_config() {
        let options = RedisOptions {
            hostname: "cache.internal".to_string(),
            port: 6380,
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: Some(3),
        };

        let config = Config::from(&options);
        assert_eq!(config.database, Some(3));
        assert_eq!(config.username.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }
}
