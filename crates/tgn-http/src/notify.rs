//! `GET /notify/{token}?message=...`
//!
//! Malformed paths, unknown tokens and failed lookups all answer a bare 404 so
//! callers cannot probe which tokens exist.

use std::sync::Arc;

use axum::{
    extract::{rejection::PathRejection, Path, RawQuery, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use tgn_core::{
    domain::Token, errors::Error, messaging::port::MessagingPort, registry::Registry,
};

/// Handler dependencies.
#[derive(Clone)]
pub struct NotifyState {
    pub registry: Arc<Registry>,
    pub messenger: Arc<dyn MessagingPort>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("not found")]
    NotFound,
    #[error("missing message")]
    BadRequest,
    #[error("delivery failed")]
    Internal,
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            NotifyError::NotFound => (StatusCode::NOT_FOUND, "404 page not found"),
            NotifyError::BadRequest => (
                StatusCode::BAD_REQUEST,
                "400 bad request - no message body",
            ),
            NotifyError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "500 internal server error - message failed to send",
            ),
        };
        (status, body).into_response()
    }
}

pub const SENT: &str = "message sent";

pub fn router(state: NotifyState) -> Router {
    Router::new()
        .route("/notify/{token}", get(notify).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> NotifyError {
    NotifyError::NotFound
}

async fn notify(
    State(state): State<NotifyState>,
    method: Method,
    path: Result<Path<String>, PathRejection>,
    RawQuery(query): RawQuery,
) -> Result<&'static str, NotifyError> {
    // axum routes HEAD through `get` handlers.
    if method != Method::GET {
        return Err(NotifyError::NotFound);
    }
    let Ok(Path(raw)) = path else {
        return Err(NotifyError::NotFound);
    };
    let token = Token::parse(&raw).ok_or(NotifyError::NotFound)?;

    info!(token = token.redacted(), "notify request");

    let message = message_param(query.as_deref()).ok_or(NotifyError::BadRequest)?;

    let chat_id = match state.registry.resolve(&token).await {
        Ok(chat_id) => chat_id,
        Err(Error::UnknownToken) => return Err(NotifyError::NotFound),
        Err(e) => {
            error!(token = token.redacted(), "token lookup failed: {e}");
            return Err(NotifyError::NotFound);
        }
    };

    state
        .messenger
        .send_text(chat_id, &message)
        .await
        .map_err(|e| {
            warn!(chat_id = %chat_id, "message failed to send: {e}");
            NotifyError::Internal
        })?;

    Ok(SENT)
}

/// First `message` value of a form-encoded query, unless it is empty.
fn message_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "message")
        .map(|(_, v)| v.into_owned())
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use tower::ServiceExt;

    use tgn_core::{
        domain::ChatId,
        store::TokenStore,
        Result,
    };
    use tgn_sqlite::SqliteTokenStore;

    use super::*;

    #[derive(Default)]
    struct FakeMessenger {
        sent: Mutex<Vec<(ChatId, String)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::External("telegram error: chat not found".to_string()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    /// Counts lookups so tests can assert the store was never consulted.
    struct CountingStore {
        inner: SqliteTokenStore,
        lookups: AtomicUsize,
        broken: AtomicBool,
    }

    impl TokenStore for CountingStore {
        fn put(&self, chat_id: ChatId, token: &Token) -> Result<()> {
            self.inner.put(chat_id, token)
        }
        fn get_chat(&self, token: &Token) -> Result<ChatId> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::Storage("sqlite error: disk I/O error".to_string()));
            }
            self.inner.get_chat(token)
        }
        fn delete(&self, chat_id: ChatId) -> Result<()> {
            self.inner.delete(chat_id)
        }
        fn token_for(&self, chat_id: ChatId) -> Result<Option<Token>> {
            self.inner.token_for(chat_id)
        }
        fn replace(&self, chat_id: ChatId, token: &Token) -> Result<()> {
            self.inner.replace(chat_id, token)
        }
    }

    struct Harness {
        app: Router,
        registry: Arc<Registry>,
        store: Arc<CountingStore>,
        messenger: Arc<FakeMessenger>,
    }

    fn harness() -> Harness {
        let store = Arc::new(CountingStore {
            inner: SqliteTokenStore::open_in_memory().unwrap(),
            lookups: AtomicUsize::new(0),
            broken: AtomicBool::new(false),
        });
        let registry = Arc::new(Registry::new(store.clone()));
        let messenger = Arc::new(FakeMessenger::default());
        let app = router(NotifyState {
            registry: registry.clone(),
            messenger: messenger.clone(),
        });
        Harness {
            app,
            registry,
            store,
            messenger,
        }
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn known_token_sends_once() {
        let h = harness();
        let token = h.registry.register(ChatId(42)).await.unwrap();

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/notify/{token}?message=hello"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], SENT.as_bytes());

        assert_eq!(
            *h.messenger.sent.lock().unwrap(),
            vec![(ChatId(42), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn message_is_form_decoded() {
        let h = harness();
        let token = h.registry.register(ChatId(1)).await.unwrap();

        let (status, _) = get(
            &h.app,
            &format!("/notify/{token}?message=build+%231+passed%21&x=y"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            h.messenger.sent.lock().unwrap()[0].1,
            "build #1 passed!".to_string()
        );
    }

    #[tokio::test]
    async fn missing_or_empty_message_is_bad_request() {
        let h = harness();
        let token = h.registry.register(ChatId(1)).await.unwrap();

        for uri in [
            format!("/notify/{token}"),
            format!("/notify/{token}?message="),
            format!("/notify/{token}?other=1"),
        ] {
            let (status, body) = get(&h.app, &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, "400 bad request - no message body");
        }

        assert!(h.messenger.sent.lock().unwrap().is_empty());
        assert_eq!(h.store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_paths_are_not_found_without_lookup() {
        let h = harness();
        let token = h.registry.register(ChatId(1)).await.unwrap();

        for uri in [
            "/notify/short?message=hi".to_string(),
            format!("/notify/{token}x?message=hi"),
            format!("/notify/{token}/?message=hi"),
            format!("/notify/{token}/extra?message=hi"),
            format!("/other/{token}?message=hi"),
            "/notify?message=hi".to_string(),
            "/notify/?message=hi".to_string(),
            "/".to_string(),
        ] {
            let (status, body) = get(&h.app, &uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, "404 page not found");
        }

        assert_eq!(h.store.lookups.load(Ordering::SeqCst), 0);
        assert!(h.messenger.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_token_looks_like_bad_path() {
        let h = harness();
        let stranger = Token::generate();

        let (status, body) = get(&h.app, &format!("/notify/{stranger}?message=hi")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found");
        assert_eq!(h.store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn superseded_token_is_not_found() {
        let h = harness();
        let old = h.registry.register(ChatId(5)).await.unwrap();
        let new = h.registry.register(ChatId(5)).await.unwrap();

        let (status, _) = get(&h.app, &format!("/notify/{old}?message=hi")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(&h.app, &format!("/notify/{new}?message=hi")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.messenger.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_internal_error() {
        let h = harness();
        let token = h.registry.register(ChatId(5)).await.unwrap();
        h.messenger.fail.store(true, Ordering::SeqCst);

        let (status, body) = get(&h.app, &format!("/notify/{token}?message=hi")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "500 internal server error - message failed to send");
    }

    #[tokio::test]
    async fn storage_failure_is_not_found() {
        let h = harness();
        let token = h.registry.register(ChatId(5)).await.unwrap();
        h.store.broken.store(true, Ordering::SeqCst);

        let (status, body) = get(&h.app, &format!("/notify/{token}?message=hi")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found");
        assert!(h.messenger.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_methods_are_not_found() {
        let h = harness();
        let token = h.registry.register(ChatId(5)).await.unwrap();

        for method in ["HEAD", "POST", "PUT", "DELETE"] {
            let resp = h
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(format!("/notify/{token}?message=hi"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{method}");
        }

        assert!(h.messenger.sent.lock().unwrap().is_empty());
        assert_eq!(h.store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn message_param_takes_first_value() {
        assert_eq!(
            message_param(Some("message=a&message=b")),
            Some("a".to_string())
        );
        assert_eq!(message_param(Some("message=")), None);
        assert_eq!(message_param(None), None);
    }
}
