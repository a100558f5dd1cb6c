//! Session management middleware for tower applications.
//!
//! [`SessionLayer`] drives a [`SessionHandler`] around every request: the
//! session is opened and read before the inner service runs, and written,
//! touched or destroyed once it has produced a response. Expired records are
//! purged on a configurable fraction of requests. The handler is always
//! closed before the response leaves the middleware.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use tower_cookies::Cookies;

use crate::cipher::Cipher;
use crate::config::{self, SessionConfig};
use crate::handler::{self, HandlerOptions, SessionHandler};
use crate::session::{self, Inner};
use crate::store::{AnyStore, SessionStore};
use crate::{CookieOptions, Id, SessionData};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Handler(#[from] handler::Error),

    #[error(transparent)]
    Session(#[from] session::Error),
}

/// Whether the middleware persists the session after the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionMode {
    /// Changes are written back once the inner service responds.
    #[default]
    ReadWrite,
    /// The session is read and closed again without any write.
    ReadOnly,
}

/// A Tower Middleware to use `Session`.
#[derive(Clone)]
pub struct SessionService<S, T: SessionStore> {
    inner: S,
    store: T,
    cipher: Arc<dyn Cipher>,
    options: Arc<HandlerOptions>,
    mode: SessionMode,
}

impl<S, T: SessionStore> std::fmt::Debug for SessionService<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("options", &self.options)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

impl<ReqBody, ResBody, S, T> Service<Request<ReqBody>> for SessionService<S, T>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
    T: SessionStore,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // the clone is not necessarily ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let handler = SessionHandler::new(
            self.store.clone(),
            Arc::clone(&self.cipher),
            Arc::clone(&self.options),
        );
        let mode = self.mode;

        Box::pin(async move {
            let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                tracing::error!("cookies not found in the request extensions");
                return Ok(internal_error());
            };
            let mut handler = handler.with_cookies(cookies.clone());

            let session = match load(&mut handler, &cookies).await {
                Ok(session) => Arc::new(session),
                Err(err) => {
                    tracing::error!(err = %err, "failed to load session");
                    close(&mut handler).await;
                    return Ok(internal_error());
                }
            };
            req.extensions_mut().insert(Arc::clone(&session));

            let res = match inner.call(req).await {
                Ok(res) => res,
                Err(err) => {
                    close(&mut handler).await;
                    return Err(err);
                }
            };

            let saved = match mode {
                SessionMode::ReadWrite => match persist(&mut handler, &session, &cookies).await {
                    Ok(()) => collect(&mut handler).await,
                    Err(err) => Err(err),
                },
                SessionMode::ReadOnly => Ok(()),
            };
            let closed = handler.close().await.map_err(Error::from);

            match saved.and(closed) {
                Ok(()) => Ok(res),
                Err(err) => {
                    tracing::error!(err = %err, "failed to save session");
                    Ok(internal_error())
                }
            }
        })
    }
}

/// Opens the handler and loads the session named by the request's cookie.
async fn load<T: SessionStore>(
    handler: &mut SessionHandler<T>,
    cookies: &Cookies,
) -> Result<Inner, Error> {
    let name = handler.options().cookie_options.name;
    handler.open(None, name).await?;

    let presented = cookies.get(name).map(|cookie| cookie.value().parse::<Id>());
    let session_id = match presented {
        None => None,
        Some(Err(err)) => {
            tracing::warn!(err = %err, "possibly suspicious activity: malformed session id");
            handler.reject();
            None
        }
        Some(Ok(session_id)) => {
            if handler.validate_id(&session_id).await? {
                Some(session_id)
            } else {
                tracing::debug!("unrecognized session id");
                None
            }
        }
    };

    let data = match &session_id {
        Some(session_id) => {
            let payload = handler.read(session_id).await?;
            SessionData::decode(&payload).unwrap_or_else(|err| {
                tracing::warn!(err = %err, "undecodable session payload, starting empty");
                SessionData::default()
            })
        }
        None => SessionData::default(),
    };

    Ok(Inner::new(session_id, data))
}

/// Writes the outcome of the request back through the handler.
async fn persist<T: SessionStore>(
    handler: &mut SessionHandler<T>,
    session: &Inner,
    cookies: &Cookies,
) -> Result<(), Error> {
    let options = handler.options().cookie_options;
    let current = *session.id.read();

    if session.is_deleted() {
        match current {
            Some(session_id) => {
                handler.destroy(&session_id).await?;
            }
            None => cookies.remove(options.removal(options.name)),
        }
        return Ok(());
    }

    let data = session.data.read().encode()?;

    if !session.is_changed() {
        if let Some(session_id) = current {
            handler.update_timestamp(&session_id, &data).await?;
        }
        return Ok(());
    }

    let (session_id, issued) = match current {
        Some(session_id) if !session.wants_regeneration() => (session_id, false),
        None if data.is_empty() => return Ok(()),
        previous => {
            let Some(session_id) = handler.create_sid() else {
                return Ok(());
            };
            if let Some(previous) = previous {
                handler.destroy(&previous).await?;
            }
            *session.id.write() = Some(session_id);
            (session_id, true)
        }
    };

    handler.write(&session_id, &data).await?;
    if issued {
        cookies.add(options.cookie(options.name, session_id.to_string()));
    }
    Ok(())
}

/// Purges expired records on a fraction of requests.
async fn collect<T: SessionStore>(handler: &mut SessionHandler<T>) -> Result<(), Error> {
    if let Some(removed) = handler.gc_if_due().await? {
        tracing::debug!(removed, "collected expired sessions");
    }
    Ok(())
}

async fn close<T: SessionStore>(handler: &mut SessionHandler<T>) {
    if let Err(err) = handler.close().await {
        tracing::error!(err = %err, "failed to close session");
    }
}

fn internal_error<B: Default>() -> Response<B> {
    let mut res = Response::new(B::default());
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}

/// Layer to apply [`SessionService`] middleware.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use seshat::{AesGcmCipher, CookieOptions, SessionLayer, SessionMode};
/// use seshat::store::memory::MemoryStore;
///
/// let cookie_options = CookieOptions::build()
///         .name("test_sess")
///         .http_only(true)
///         .same_site(cookie::SameSite::Lax)
///         .secure(true)
///         .max_age(30 * 60)
///         .path("/");
///
/// let cipher = Arc::new(AesGcmCipher::from_passphrase("a long random passphrase").unwrap());
/// let session_layer = SessionLayer::new(MemoryStore::new(), cipher)
///     .with_cookie_options(cookie_options)
///     .mode(SessionMode::ReadWrite);
/// ```
#[derive(Clone)]
pub struct SessionLayer<T: SessionStore> {
    store: T,
    cipher: Arc<dyn Cipher>,
    options: Arc<HandlerOptions>,
    mode: SessionMode,
}

impl<T: SessionStore> std::fmt::Debug for SessionLayer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayer")
            .field("options", &self.options)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<T> SessionLayer<T>
where
    T: SessionStore,
{
    /// Create a new session manager layer.
    pub fn new(store: T, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            store,
            cipher,
            options: Arc::new(HandlerOptions::default()),
            mode: SessionMode::default(),
        }
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Set the cookie options for the session manager.
    pub fn with_cookie_options(mut self, cookie_options: CookieOptions) -> Self {
        Arc::make_mut(&mut self.options).cookie_options = cookie_options;
        self
    }

    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }
}

impl SessionLayer<AnyStore> {
    /// Builds the store, cipher and options described by `config`.
    pub async fn from_config(config: &SessionConfig) -> Result<Self, config::Error> {
        let store = config.store().await?;
        let cipher = config.cipher()?;
        Ok(Self::new(store, cipher).with_options(config.handler_options()?))
    }
}

impl<S, T> Layer<S> for SessionLayer<T>
where
    T: SessionStore,
{
    type Service = SessionService<S, T>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            cipher: Arc::clone(&self.cipher),
            options: Arc::clone(&self.options),
            mode: self.mode,
        }
    }
}
