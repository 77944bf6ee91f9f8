#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pulse_audit::AuditPublisher;
use pulse_server::app;
use pulse_server::service::MetricsService;
use pulse_server::state::AppState;
use pulse_storage::memory::MemoryStore;
use pulse_storage::snapshot::SnapshotManager;
use pulse_storage::Store;
use rsa::RsaPrivateKey;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub struct TestContext {
    pub app: Router,
    pub store: Arc<dyn Store>,
    pub audit: Arc<AuditPublisher>,
}

pub struct TestContextOptions {
    pub hmac_key: Option<String>,
    pub private_key: Option<RsaPrivateKey>,
    pub snapshot_path: Option<PathBuf>,
    pub store_interval: Duration,
}

impl Default for TestContextOptions {
    fn default() -> Self {
        Self {
            hmac_key: None,
            private_key: None,
            snapshot_path: None,
            store_interval: Duration::from_secs(300),
        }
    }
}

pub fn build_test_context(options: TestContextOptions) -> TestContext {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let snapshot = Arc::new(SnapshotManager::new(
        options.snapshot_path,
        options.store_interval,
    ));
    let audit = Arc::new(AuditPublisher::new());
    let service = Arc::new(MetricsService::new(store.clone(), None, None));

    let state = AppState {
        service,
        store: store.clone(),
        snapshot,
        audit: audit.clone(),
        hmac_key: options.hmac_key,
        private_key: options.private_key.map(Arc::new),
    };

    TestContext {
        app: app::build_router(state),
        store,
        audit,
    }
}

pub fn plain_context() -> TestContext {
    build_test_context(TestContextOptions::default())
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.expect("request handled");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body readable");
    (status, bytes.to_vec())
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds");
    let (status, bytes) = send(app, req).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds");
    let (status, bytes) = send(app, req).await;
    (status, String::from_utf8_lossy(&bytes).to_string())
}
