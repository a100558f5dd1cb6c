#![cfg(feature = "redis-store")]

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
    use fred::clients::Client;
    use http::header::COOKIE;
    use seshat::store::SessionStore;
    use seshat::store::redis::{RedisOptions, RedisStore};
    use seshat::{HandlerOptions, Id, Session, SessionHandler, SessionLayer};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_cookies::CookieManagerLayer;

    fn redis_options() -> RedisOptions {
        let mut options = RedisOptions::default();
        if let Ok(host) = std::env::var("REDIS_HOST") {
            options.hostname = host;
        }
        options
    }

    async fn setup_redis() -> RedisStore<Client> {
        RedisStore::connect(&redis_options())
            .await
            .unwrap()
            .namespace("seshat-test:")
    }

    async fn insert_handler(session: Session) -> Result<String, StatusCode> {
        session
            .insert("user", &test_user())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        session
            .insert("preferences", &test_preferences())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok("Success".to_string())
    }

    async fn get_handler(session: Session) -> Result<String, StatusCode> {
        let data: Option<TestUser> = session
            .get("user")
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok(data
            .map(|d| d.name)
            .unwrap_or_else(|| "Not found".to_string()))
    }

    #[tokio::test]
    async fn test_store_operations() {
        let mut store = setup_redis().await;
        let session_id = Id::generate();

        assert_eq!(store.get(&session_id).await.unwrap(), None);
        assert!(store.set(&session_id, b"payload", 5).await.unwrap());
        assert_eq!(store.get(&session_id).await.unwrap(), Some(b"payload".to_vec()));
        assert!(store.touch(&session_id, 10).await.unwrap());

        assert!(store.set(&session_id, b"", 5).await.unwrap());
        assert_eq!(store.get(&session_id).await.unwrap(), Some(Vec::new()));

        assert!(store.delete(&session_id).await.unwrap());
        assert!(!store.touch(&session_id, 10).await.unwrap());
        assert_eq!(store.get(&session_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_expires() {
        let mut store = setup_redis().await;
        let session_id = Id::generate();

        store.set(&session_id, b"short lived", 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert_eq!(store.get(&session_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handler_round_trip() {
        let store = setup_redis().await;
        let options = Arc::new(HandlerOptions {
            spam_gate: true,
            ..Default::default()
        });

        let mut handler = SessionHandler::new(store.clone(), test_cipher(), Arc::clone(&options));
        handler.open(None, "test_sess").await.unwrap();
        let session_id = handler.create_sid().unwrap();
        handler.write(&session_id, b"user=1").await.unwrap();
        handler.close().await.unwrap();

        let mut handler = SessionHandler::new(store, test_cipher(), options);
        handler.open(None, "test_sess").await.unwrap();
        assert!(handler.validate_id(&session_id).await.unwrap());
        assert_eq!(handler.read(&session_id).await.unwrap(), b"user=1");
        assert!(handler.destroy(&session_id).await.unwrap());
        handler.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_across_requests() {
        let store = setup_redis().await;
        let session_layer = SessionLayer::new(store, test_cipher()).with_cookie_options(build_cookie_options());

        let app = Router::new()
            .route("/insert", get(insert_handler))
            .route("/get", get(get_handler))
            .layer(session_layer)
            .layer(CookieManagerLayer::new());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/insert").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = cookie_header(&response);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/get")
                    .header(COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), "Test User");
    }
}
