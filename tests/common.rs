/// Common test utilities for 47 Industries integration tests
///
/// Builds the full application on a private in-memory database with no
/// third-party providers wired up, and wraps request plumbing so tests read as
/// a sequence of API calls.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use fortyseven::{
    config::{base_config, ConfigUpdate},
    create_app,
    db::connect_and_migrate,
    integrations::Integrations,
    state::AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "integration-admin-token";
pub const CRON_SECRET: &str = "integration-cron-secret";
pub const LEAD_SECRET: &str = "integration-lead-secret";

/// A running application and the state behind it
pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
}

/// Creates a test application with an in-memory SQLite database
///
/// Each call gets its own shared-cache database, so pooled connections see
/// the same schema while tests stay isolated from each other.
pub fn create_test_app() -> TestApp {
    let database_url = format!("file:it_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let pool = connect_and_migrate(&database_url).unwrap();

    let config = base_config(None).apply_update(ConfigUpdate {
        admin_api_token: Some(ADMIN_TOKEN.to_string()),
        cron_secret: Some(CRON_SECRET.to_string()),
        lead_webhook_secret: Some(LEAD_SECRET.to_string()),
        site_url: Some("https://47industries.test".to_string()),
        sales_tax_bps: Some(700),
        storage_dir: Some(std::env::temp_dir().join(format!("fortyseven-it-{}", uuid::Uuid::new_v4()))),
        ..Default::default()
    });

    let state = Arc::new(AppState::new(pool, config, Integrations::default()));
    TestApp { app: create_app(state.clone()), state }
}

/// Sends a request and returns the status with the decoded JSON body
///
/// An empty body decodes to `Value::Null`.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    send_request(app, request).await
}

/// Sends a prepared request and returns the status with the decoded JSON body
pub async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// Sends a request with the admin bearer token
pub async fn admin(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send(app, method, uri, Some(ADMIN_TOKEN), body).await
}
