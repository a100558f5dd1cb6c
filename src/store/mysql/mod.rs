use crate::Id;
use crate::store::{Error, OpenContext, SessionStore, unix_now};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool};
use sqlx::pool::PoolConnection;
use sqlx::MySql;

/// A builder for creating a `MySqlStore`.
///
/// This allows for customizing the table name used for session storage.
#[derive(Debug)]
pub struct MySqlStoreBuilder {
    pool: MySqlPool,
    table_name: String,
    create_table: bool,
}

impl MySqlStoreBuilder {
    /// Creates a new builder with a database pool and default settings.
    pub fn new(pool: MySqlPool, create_table: bool) -> Self {
        Self {
            pool,
            table_name: "sessions".to_string(),
            create_table,
        }
    }

    /// Sets a custom table name for the session store. Defaults to "sessions".
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Builds the `MySqlStore`, creating the table if requested.
    pub async fn build(self) -> Result<MySqlStore, Error> {
        let table_name = format!("`{}`", self.table_name.replace('`', ""));

        if self.create_table {
            sqlx::raw_sql(&format!(
                r#"
                create table if not exists {table_name} (
                    session_id varchar(64) not null primary key,
                    data blob not null,
                    expires_at bigint not null,
                    index idx_sessions_expires_at (expires_at)
                ) engine = InnoDB
                "#
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(MySqlStore {
            pool: self.pool,
            table_name,
            conn: None,
        })
    }
}

/// Connection parameters for [`MySqlStore::connect`].
#[derive(Clone, Debug)]
pub struct MySqlOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
}

impl From<&MySqlOptions> for MySqlConnectOptions {
    fn from(options: &MySqlOptions) -> Self {
        let connect = MySqlConnectOptions::new()
            .host(&options.hostname)
            .port(options.port)
            .username(&options.username)
            .database(&options.database);

        match &options.password {
            Some(password) => connect.password(password),
            None => connect,
        }
    }
}

impl MySqlOptions {
    /// Opens a connection pool for these options.
    #[tracing::instrument(name = "connecting to mysql", skip(self), fields(host = %self.hostname, port = self.port))]
    pub async fn connect(&self) -> Result<MySqlPool, Error> {
        MySqlPool::connect_with(self.into()).await.map_err(|err| {
            tracing::error!(err = %err, "failed to connect to mysql");
            Error::Connection(err.to_string())
        })
    }
}

/// A MySQL-backed session store.
///
/// A pool connection is checked out when the session is opened and returned
/// to the pool when it is closed.
pub struct MySqlStore {
    pool: MySqlPool,
    table_name: String,
    conn: Option<PoolConnection<MySql>>,
}

impl std::fmt::Debug for MySqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlStore")
            .field("table_name", &self.table_name)
            .field("connected", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl Clone for MySqlStore {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table_name: self.table_name.clone(),
            conn: None,
        }
    }
}

impl MySqlStore {
    /// Connects a pool from `options` and builds a store on the `sessions`
    /// table, creating it if needed.
    pub async fn connect(options: &MySqlOptions) -> Result<Self, Error> {
        let pool = options.connect().await?;
        MySqlStoreBuilder::new(pool, true).build().await
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, Error> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| Error::Connection("mysql store used before open".to_string()))
    }
}

impl SessionStore for MySqlStore {
    async fn open(&mut self, _cx: &OpenContext) -> Result<(), Error> {
        if self.conn.is_none() {
            self.conn = Some(self.pool.acquire().await?);
        }
        Ok(())
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        let query = format!(
            "select data from {} where session_id = ? and expires_at > ?",
            self.table_name
        );
        let row: Option<(Vec<u8>,)> = sqlx::query_as(&query)
            .bind(session_id.to_string())
            .bind(unix_now())
            .fetch_optional(self.conn()?)
            .await?;

        Ok(row.map(|(data,)| data))
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        let query = format!(
            r#"
            insert into {} (session_id, data, expires_at) values (?, ?, ?)
            on duplicate key update data = values(data), expires_at = values(expires_at)
            "#,
            self.table_name
        );
        sqlx::query(&query)
            .bind(session_id.to_string())
            .bind(payload)
            .bind(unix_now() + ttl_secs)
            .execute(self.conn()?)
            .await?;

        Ok(true)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        let now = unix_now();
        let query = format!(
            "update {} set expires_at = ? where session_id = ? and expires_at > ?",
            self.table_name
        );
        let result = sqlx::query(&query)
            .bind(now + ttl_secs)
            .bind(session_id.to_string())
            .bind(now)
            .execute(self.conn()?)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // an update that leaves the row unchanged reports no affected rows
        let query = format!(
            "select 1 from {} where session_id = ? and expires_at > ?",
            self.table_name
        );
        let exists: Option<(i64,)> = sqlx::query_as(&query)
            .bind(session_id.to_string())
            .bind(now)
            .fetch_optional(self.conn()?)
            .await?;

        Ok(exists.is_some())
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        let query = format!("delete from {} where session_id = ?", self.table_name);
        let result = sqlx::query(&query)
            .bind(session_id.to_string())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "collecting expired mysql sessions", skip(self))]
    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        let query = format!("delete from {} where expires_at <= ?", self.table_name);
        let result = sqlx::query(&query)
            .bind(unix_now())
            .execute(self.conn()?)
            .await?;

        tracing::debug!(removed = result.rows_affected(), "removed expired sessions");
        Ok(result.rows_affected())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.conn = None;
        Ok(())
    }
}
