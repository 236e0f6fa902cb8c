use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use pestguard_api::auth::{issue_token, UserRole};
use pestguard_api::config::AppConfig;
use pestguard_api::db::{connect_in_memory, run_migrations};
use pestguard_api::events::EventSender;
use pestguard_api::{app_router, build_cors, AppState};

pub const JWT_SECRET: &str =
    "an_extremely_long_testing_jwt_secret_value_0123456789_abcdefghijklmnop";
pub const WEBHOOK_SECRET: &str = "whsec_integration_test";
pub const OWNER_EMAIL: &str = "owner@pestguard.test";

pub struct TestApp {
    pub router: Router,
    _dir: tempfile::TempDir,
    _rx: mpsc::Receiver<pestguard_api::events::Event>,
}

pub struct TestAppOptions {
    pub webhook_secret: Option<String>,
    pub owner_emails: Option<String>,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            owner_emails: Some(OWNER_EMAIL.to_string()),
        }
    }
}

pub async fn spawn_app(options: TestAppOptions) -> TestApp {
    let dir = tempfile::tempdir().unwrap();

    let mut config = AppConfig::new(
        "sqlite::memory:".into(),
        JWT_SECRET.into(),
        3600,
        "127.0.0.1".into(),
        0,
        "development".into(),
    );
    config.billing_store_path = dir
        .path()
        .join("billing.json")
        .to_string_lossy()
        .into_owned();
    config.stripe_webhook_secret = options.webhook_secret;
    config.stripe_webhook_tolerance_secs = Some(300);
    config.owner_emails = options.owner_emails;

    let db = Arc::new(connect_in_memory().await.unwrap());
    run_migrations(&db).await.unwrap();

    let (tx, rx) = mpsc::channel(64);
    let cors = build_cors(&config).unwrap();
    let state = AppState::new(db, Arc::new(config), EventSender::new(tx)).unwrap();
    let router = app_router(state, cors);

    TestApp {
        router,
        _dir: dir,
        _rx: rx,
    }
}

pub fn token_for(role: UserRole, email: &str, company_id: Option<Uuid>) -> String {
    issue_token("test-user", email, role, company_id, JWT_SECRET, 600).unwrap()
}

pub fn owner_token() -> String {
    token_for(UserRole::Admin, OWNER_EMAIL, None)
}

pub async fn send_request(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

pub async fn send_json(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = send_request(app, method, uri, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
