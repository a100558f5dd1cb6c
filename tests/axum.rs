mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use axum::{
        Router,
        body::Body,
        extract::Request,
        http::{self, StatusCode},
        routing::get,
    };
    use http::header::{COOKIE, SET_COOKIE};
    use seshat::store::cookie::CookieStore;
    use seshat::store::file::FileStore;
    use seshat::store::memory::MemoryStore;
    use seshat::store::{OpenContext, SessionStore};
    use seshat::{Backend, HandlerOptions, Session, SessionConfig, SessionLayer, SessionMode};
    use tower::ServiceExt;
    use tower_cookies::CookieManagerLayer;

    async fn insert_handler(session: Session) -> Result<String, StatusCode> {
        session
            .insert("user", &test_user())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok("Success".to_string())
    }

    async fn get_handler(session: Session) -> Result<String, StatusCode> {
        let user: Option<TestUser> = session
            .get("user")
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok(user
            .map(|u| u.name)
            .unwrap_or_else(|| "Not found".to_string()))
    }

    async fn id_handler(session: Session) -> String {
        session.id().map(|id| id.to_string()).unwrap_or_default()
    }

    async fn regenerate_handler(session: Session) -> String {
        session.regenerate();
        "Regenerated".to_string()
    }

    async fn destroy_handler(session: Session) -> String {
        session.destroy();
        "Destroyed".to_string()
    }

    fn routes() -> Router {
        Router::new()
            .route("/set", get(insert_handler))
            .route("/get", get(get_handler))
            .route("/id", get(id_handler))
            .route("/regenerate", get(regenerate_handler))
            .route("/destroy", get(destroy_handler))
    }

    fn app_with<T: SessionStore>(layer: SessionLayer<T>) -> Router {
        routes()
            .layer(layer.with_cookie_options(build_cookie_options()))
            .layer(CookieManagerLayer::new())
    }

    // probabilistic gc stays off so call sequences are deterministic
    fn test_options() -> HandlerOptions {
        HandlerOptions {
            gc_probability: 0.0,
            ..Default::default()
        }
    }

    fn create_test_app(store: RecordingStore) -> Router {
        app_with(SessionLayer::new(store, test_cipher()).with_options(test_options()))
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let builder = Request::builder().uri(uri);
        let builder = match cookie {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: http::Response<Body>) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_new_session_sets_cookie() {
        let store = RecordingStore::new();
        let app = create_test_app(store.clone());

        let response = app.oneshot(request("/set", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie_str = response
            .headers()
            .get(SET_COOKIE)
            .expect("Set-Cookie header should be present")
            .to_str()
            .unwrap();
        assert!(cookie_str.contains("test_sess="));
        assert!(cookie_str.contains("HttpOnly"));
        assert!(cookie_str.contains("Secure"));
        assert!(cookie_str.contains("SameSite=Lax"));

        assert_eq!(store.calls(), ["open", "set", "close"]);
        assert_eq!(store.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_untouched_new_session_is_not_stored() {
        let store = RecordingStore::new();
        let app = create_test_app(store.clone());

        let response = app.oneshot(request("/get", None)).await.unwrap();
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "Not found");

        assert_eq!(store.calls(), ["open", "close"]);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_existing_session_is_read_and_touched() {
        let store = RecordingStore::new();
        let app = create_test_app(store.clone());

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);
        store.reset();

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "Test User");

        assert_eq!(store.data_calls(), ["get", "touch"]);
    }

    #[tokio::test]
    async fn test_regenerate_moves_session_to_new_id() {
        let store = RecordingStore::new();
        let app = create_test_app(store.clone());

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);

        let old_id = body_string(
            app.clone()
                .oneshot(request("/id", Some(&cookie)))
                .await
                .unwrap(),
        )
        .await;

        let response = app
            .clone()
            .oneshot(request("/regenerate", Some(&cookie)))
            .await
            .unwrap();
        let new_cookie = cookie_header(&response);
        assert!(new_cookie.starts_with("test_sess="));
        assert!(!new_cookie.contains(&old_id));
        assert_eq!(store.inner.len(), 1);

        let response = app
            .clone()
            .oneshot(request("/get", Some(&new_cookie)))
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "Test User");

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(body_string(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_destroy_removes_record_and_cookie() {
        let store = RecordingStore::new();
        let app = create_test_app(store.clone());

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);

        let response = app
            .clone()
            .oneshot(request("/destroy", Some(&cookie)))
            .await
            .unwrap();
        let removal = response
            .headers()
            .get(SET_COOKIE)
            .expect("the session cookie should be removed")
            .to_str()
            .unwrap();
        assert!(removal.starts_with("test_sess="));
        assert!(removal.contains("Max-Age=0"));
        assert!(store.inner.is_empty());

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(body_string(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_read_only_mode_never_writes() {
        let store = RecordingStore::new();
        let app = app_with(
            SessionLayer::new(store.clone(), test_cipher())
                .with_options(test_options())
                .mode(SessionMode::ReadOnly),
        );

        let response = app.oneshot(request("/set", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());

        assert_eq!(store.calls(), ["open", "close"]);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_session_id() {
        let app = create_test_app(RecordingStore::new());

        let response = app
            .oneshot(request("/get", Some("test_sess=invalid_session_id")))
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_spam_gate_rejects_unknown_id() {
        let store = RecordingStore::new();
        let options = HandlerOptions {
            spam_gate: true,
            ..test_options()
        };
        let app = app_with(SessionLayer::new(store.clone(), test_cipher()).with_options(options));

        let unknown = format!("test_sess={}", seshat::Id::generate());
        let response = app.oneshot(request("/set", Some(&unknown))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let removal = response
            .headers()
            .get(SET_COOKIE)
            .expect("the rejected cookie should be removed")
            .to_str()
            .unwrap();
        assert!(removal.contains("Max-Age=0"));

        assert_eq!(store.data_calls(), ["get"]);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_request_collects_expired_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = FileStore::new(dir.path());
        raw.open(&OpenContext::new("test_sess")).await.unwrap();
        raw.set(&seshat::Id::generate(), b"abandoned", -1).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let never = app_with(
            SessionLayer::new(FileStore::new(dir.path()), test_cipher()).with_options(test_options()),
        );
        never.oneshot(request("/get", None)).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let always = HandlerOptions {
            gc_probability: 1.0,
            ..Default::default()
        };
        let app = app_with(SessionLayer::new(FileStore::new(dir.path()), test_cipher()).with_options(always));
        let response = app.oneshot(request("/get", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_read_only_mode_skips_collection() {
        let store = RecordingStore::new();
        let always = HandlerOptions {
            gc_probability: 1.0,
            ..Default::default()
        };
        let app = app_with(
            SessionLayer::new(store.clone(), test_cipher())
                .with_options(always)
                .mode(SessionMode::ReadOnly),
        );

        app.oneshot(request("/get", None)).await.unwrap();
        assert_eq!(store.calls(), ["open", "close"]);
    }

    #[tokio::test]
    async fn test_backend_fault_is_internal_error() {
        let app = app_with(SessionLayer::new(FailingStore, test_cipher()));

        let response = app.oneshot(request("/set", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_cookie_middleware() {
        // Create app without CookieManagerLayer
        let app = routes().layer(SessionLayer::new(MemoryStore::new(), test_cipher()));

        let response = app.oneshot(request("/set", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(SessionLayer::new(FileStore::new(dir.path()), test_cipher()));

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(body_string(response).await, "Test User");
    }

    #[tokio::test]
    async fn test_cookie_backend() {
        let app = app_with(SessionLayer::new(CookieStore::new(build_cookie_options()), test_cipher()));

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);
        assert!(cookie.contains("test_sess="));
        assert!(cookie.contains("test_sess_data="));
        assert!(!cookie.contains("Test User"));

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(body_string(response).await, "Test User");
    }

    #[tokio::test]
    async fn test_layer_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(Backend::File)
            .save_path(dir.path())
            .key("integration tests")
            .cookie_options(build_cookie_options());
        let layer = SessionLayer::from_config(&config).await.unwrap();
        let app = app_with(layer);

        let response = app.clone().oneshot(request("/set", None)).await.unwrap();
        let cookie = cookie_header(&response);

        let response = app.oneshot(request("/get", Some(&cookie))).await.unwrap();
        assert_eq!(body_string(response).await, "Test User");
    }
}
