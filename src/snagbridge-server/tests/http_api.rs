//! End-to-end tests of the HTTP surface with in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use snagbridge_bugsnag::ErrorBackend;
use snagbridge_chat::ChatUser;
use snagbridge_engine::testing::{FakeBackend, FakeChat};
use snagbridge_server::{AppState, ServerConfig, create_router};
use async_trait::async_trait;
use snagbridge_store::{CardStore, KvStore, MemoryKv, RoutingRule, keys};
use tower::ServiceExt;

const PAYLOAD: &str = r#"{
    "project": {"id": "p1", "name": "Checkout"},
    "trigger": {"type": "firstException", "message": "New error"},
    "error": {
        "errorId": "e1",
        "exceptionClass": "TypeError",
        "message": "boom",
        "url": "https://app.bugsnag.com/acme/checkout/errors/e1",
        "severity": "error",
        "status": "open",
        "app": {"releaseStage": "production"}
    }
}"#;

/// Counts every read and write reaching the backend.
#[derive(Default)]
struct CountingKv {
    inner: MemoryKv,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingKv {
    fn calls(&self) -> (usize, usize) {
        (self.gets.load(Ordering::SeqCst), self.sets.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl KvStore for CountingKv {
    async fn get(&self, key: &str) -> snagbridge_store::Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> snagbridge_store::Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    chat: Arc<FakeChat>,
    backend: Arc<FakeBackend>,
}

async fn app_with(config: ServerConfig, with_backend: bool) -> TestApp {
    let store = CardStore::in_memory("test");
    store
        .save_routing_rules(&[RoutingRule::new("p1", "c1")])
        .await
        .unwrap();
    app_on(config, store, with_backend)
}

fn app_on(config: ServerConfig, store: CardStore, with_backend: bool) -> TestApp {
    let chat = Arc::new(FakeChat::new());
    chat.add_user(ChatUser {
        id: "u1".into(),
        username: "ada".into(),
        email: "ada@example.com".into(),
    });
    let backend = Arc::new(FakeBackend::new());
    let state = Arc::new(AppState::new(
        &config,
        store,
        chat.clone(),
        with_backend.then(|| backend.clone() as Arc<dyn ErrorBackend>),
    ));
    TestApp {
        router: create_router(state.clone()),
        state,
        chat,
        backend,
    }
}

async fn app() -> TestApp {
    let mut config = ServerConfig::default();
    config.webhook.token = Some(SecretString::from("tok"));
    app_with(config, true).await
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn webhook_rejects_missing_and_wrong_tokens() {
    let app = app().await;

    let (status, body) = send(&app.router, Method::POST, "/webhook", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["message"], "missing webhook token");

    let (status, _) = send(&app.router, Method::POST, "/webhook?token=nope", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.chat.card_count(), 0);
}

#[tokio::test]
async fn unauthorized_webhook_never_touches_the_store() {
    let kv = Arc::new(CountingKv::default());
    let mut config = ServerConfig::default();
    config.webhook.token = Some(SecretString::from("tok"));
    let app = app_on(config, CardStore::new(kv.clone()), true);

    send(&app.router, Method::POST, "/webhook", Some(PAYLOAD)).await;
    send(&app.router, Method::POST, "/webhook?token=nope", Some(PAYLOAD)).await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("X-Bugsnag-Token", "wrong")
        .body(Body::from(PAYLOAD))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(kv.calls(), (0, 0));
}

#[tokio::test]
async fn unreadable_routing_rules_fail_the_webhook() {
    let kv = Arc::new(MemoryKv::new());
    kv.set(keys::ROUTING_RULES, b"{not a list".to_vec())
        .await
        .unwrap();
    let app = app_on(ServerConfig::default(), CardStore::new(kv), true);

    let (status, body) = send(&app.router, Method::POST, "/webhook", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
    assert_eq!(app.chat.card_count(), 0);
}

#[tokio::test]
async fn webhook_accepts_header_token() {
    let app = app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("X-Bugsnag-Token", "tok")
        .body(Body::from(PAYLOAD))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().contains_key("X-Request-Id"));
}

#[tokio::test]
async fn webhook_creates_then_updates_one_card() {
    let app = app().await;

    let (status, body) = send(&app.router, Method::POST, "/webhook?token=tok", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "accepted", "processed": 1}));

    let (status, body) = send(&app.router, Method::POST, "/webhook?token=tok", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["processed"], 1);
    assert_eq!(app.chat.card_count(), 1);

    let mapping = app.state.store.card_mapping("p1", "e1").await.unwrap().unwrap();
    assert_eq!(mapping.channel_id, "c1");
    assert_eq!(app.state.store.active_errors().await.unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_rejects_bad_payloads() {
    let app = app().await;

    let (status, body) = send(&app.router, Method::POST, "/webhook?token=tok", Some("{nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/webhook?token=tok",
        Some(r#"{"project":{"id":"p1"},"error":{}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/webhook?token=tok&channel_id=ghost",
        Some(PAYLOAD),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.chat.card_count(), 0);
}

#[tokio::test]
async fn webhook_only_accepts_post() {
    let app = app().await;
    let (status, _) = send(&app.router, Method::GET, "/webhook?token=tok", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn webhook_without_configured_token_is_open() {
    let app = app_with(ServerConfig::default(), true).await;
    let (status, _) = send(&app.router, Method::POST, "/webhook", Some(PAYLOAD)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn actions_only_accept_post() {
    let app = app().await;
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let (status, _) = send(&app.router, method, "/actions", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}

#[tokio::test]
async fn resolve_action_updates_card() {
    let app = app().await;
    send(&app.router, Method::POST, "/webhook?token=tok", Some(PAYLOAD)).await;
    let post_id = app
        .state
        .store
        .card_mapping("p1", "e1")
        .await
        .unwrap()
        .unwrap()
        .post_id;

    let press = json!({
        "user_id": "u1",
        "channel_id": "c1",
        "post_id": post_id,
        "context": {"action": "resolve", "project_id": "p1", "error_id": "e1"}
    })
    .to_string();
    let (status, body) = send(&app.router, Method::POST, "/actions", Some(&press)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["card_updated"], true);
    assert!(
        body["text"]
            .as_str()
            .unwrap()
            .ends_with("status set to fixed in Bugsnag")
    );
    assert_eq!(app.backend.calls(), vec!["update_status p1/e1 fix".to_string()]);
}

#[tokio::test]
async fn action_errors_and_navigation() {
    let app = app().await;

    let (status, body) = send(&app.router, Method::POST, "/actions", Some("[]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid interactive action payload")
    );

    let press = r#"{"user_id":"u1","context":{"action":"dance"}}"#;
    let (status, _) = send(&app.router, Method::POST, "/actions", Some(press)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let press = r#"{"context":{"action":"open_in_browser","error_url":"https://x/e1"}}"#;
    let (status, body) = send(&app.router, Method::POST, "/actions", Some(press)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"type": "ok", "open_in_browser": "https://x/e1"}));
}

#[tokio::test]
async fn channel_rules_round_trip_through_admin_api() {
    let app = app().await;

    let (status, body) = send(
        &app.router,
        Method::PUT,
        "/api/v1/channel-rules",
        Some(r#"{"mappings":[{"project_id":" p2 ","channel_id":"c2","environments":["production"]}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mappings"][0]["project_id"], "p2");

    let (status, body) = send(&app.router, Method::GET, "/api/v1/channel-rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mappings"].as_array().unwrap().len(), 1);
    assert_eq!(body["mappings"][0]["environments"], json!(["production"]));

    let (status, body) = send(
        &app.router,
        Method::PUT,
        "/api/v1/channel-rules",
        Some(r#"[{"project_id":"p3"}]"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = send(
        &app.router,
        Method::PUT,
        "/api/v1/channel-rules",
        Some(r#"[{"project_id":"p3","channel_id":" "}]"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn user_mappings_round_trip_through_admin_api() {
    let app = app().await;

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/v1/user-mappings",
        Some(r#"[{"mm_user_id":"u1","bugsnag_email":"ada@example.com"}]"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app.router, Method::GET, "/api/v1/user-mappings", None).await;
    assert_eq!(
        body,
        json!({"mappings": [{"mm_user_id": "u1", "bugsnag_email": "ada@example.com"}]})
    );

    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/api/v1/user-mappings",
        Some(r#"[{"mm_user_id":"u1"}]"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn listings_use_the_backend() {
    let mut config = ServerConfig::default();
    config.bugsnag.organization_id = Some("org1".into());
    let app = app_with(config, true).await;

    let (status, body) = send(&app.router, Method::GET, "/api/v1/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization_id"], "org1");

    let (status, _) = send(
        &app.router,
        Method::GET,
        "/api/v1/collaborators?organization_id=org2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.backend.calls(),
        vec!["list_projects org1".to_string(), "list_collaborators org2".to_string()]
    );

    app.backend.fail_all(true);
    let (status, body) = send(&app.router, Method::GET, "/api/v1/organizations", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "bad_gateway");
}

#[tokio::test]
async fn listings_need_a_backend() {
    let app = app_with(ServerConfig::default(), false).await;
    let (status, body) = send(&app.router, Method::GET, "/api/v1/organizations", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "service_unavailable");

    // no configured organization and none visible to the token
    let app = app_with(ServerConfig::default(), true).await;
    let (status, _) = send(&app.router, Method::GET, "/api/v1/projects", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn health_reports_sync_state() {
    let app = app().await;
    let (status, body) = send(&app.router, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sync_running"], false);

    assert!(app.state.start_sync(std::time::Duration::from_secs(300)).await);
    let (_, body) = send(&app.router, Method::GET, "/api/v1/health", None).await;
    assert_eq!(body["sync_running"], true);
    app.state.shutdown().await;
}
