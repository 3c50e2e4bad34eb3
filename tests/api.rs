mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use common::{harness, FixedIndex, Step};
use ragchat::api::{self, AppState, SharedState};
use ragchat::auth::AuthService;
use ragchat::storage::AccountStore;

struct TestApp {
    _dir: TempDir,
    state: SharedState,
    router: Router,
}

fn app(steps: Vec<Step>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = AccountStore::open(dir.path().join("users.db")).unwrap();
    let h = harness(FixedIndex::with_texts(&["Scheme: Senior Citizen"]), steps);

    let state = Arc::new(AppState {
        pipeline: h.pipeline,
        auth: AuthService::new(store, Duration::from_secs(7200)),
    });

    TestApp {
        router: api::router(state.clone(), "http://localhost:3000").unwrap(),
        state,
        _dir: dir,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_raw(uri: &str, body: &'static str, content_type: Option<&str>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn register_and_login(app: &TestApp) -> String {
    let creds = json!({ "username": "asha", "password": "secret" });

    let (status, body) = send(app, post("/signup", creds.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");

    let (status, body) = send(app, post("/login", creds, None)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn home_reports_running() {
    let app = app(vec![]);
    let (status, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chatbot API is running!");
}

#[tokio::test]
async fn chat_requires_token() {
    let app = app(vec![]);

    let (status, body) = send(&app, post("/chat", json!({ "message": "hi" }), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Token is missing!");

    let (status, body) = send(&app, post("/chat", json!({ "message": "hi" }), Some("forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token!");
}

#[tokio::test]
async fn signup_validation() {
    let app = app(vec![]);

    let (status, body) = send(&app, post("/signup", json!({ "username": "asha" }), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password required");

    register_and_login(&app).await;
    let (status, body) = send(
        &app,
        post("/signup", json!({ "username": "asha", "password": "x" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");

    let (status, body) = send(
        &app,
        post("/login", json!({ "username": "asha", "password": "wrong" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn chat_answers_authenticated_user() {
    let app = app(vec![Step::ok("Seniors get 40% off.\n")]);
    let token = register_and_login(&app).await;

    let (status, body) = send(
        &app,
        post("/chat", json!({ "message": "Senior discount?" }), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "response": "Seniors get 40% off." }));
}

#[tokio::test]
async fn empty_chat_message_is_bad_request() {
    let app = app(vec![]);
    let token = register_and_login(&app).await;

    let (status, body) = send(&app, post("/chat", json!({ "message": "  " }), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Empty message received");

    let (status, _) = send(&app, post("/chat", json!({}), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn model_timeout_is_server_error() {
    let app = app(vec![Step::Hang]);
    let token = register_and_login(&app).await;

    let (status, body) = send(&app, post("/chat", json!({ "message": "hi" }), Some(&token))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model timed out after 60s");
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = app(vec![]);

    let (status, body) = send(
        &app,
        post_raw("/signup", "not json", Some("application/json"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = send(&app, post_raw("/login", "{}", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let token = register_and_login(&app).await;
    let (status, body) = send(&app, post("/chat", json!({ "message": 5 }), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
    assert_eq!(app.state.pipeline.memory().get("1").await, "");
}

#[tokio::test(start_paused = true)]
async fn chat_completes_after_client_hangs_up() {
    let app = app(vec![Step::slow_ok("Seniors get 40% off.", Duration::from_secs(5))]);
    let token = register_and_login(&app).await;

    let request = post("/chat", json!({ "message": "Senior discount?" }), Some(&token));
    let abandoned = tokio::time::timeout(Duration::from_secs(1), app.router.clone().oneshot(request)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        app.state.pipeline.memory().get("1").await,
        "Senior discount?\nBot: Seniors get 40% off."
    );
}
