//! Shared helpers for route-level HTTP tests: spin up a real axum `Router`
//! over an in-memory SQLite pool and a policy document written to a temp
//! file, then drive it with `tower::ServiceExt::oneshot`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use govrun_core::config::RuntimeConfig;
use govrun_core::policy::{PolicyDocument, PolicyStore};
use govrun_core::storage::{init_test_db, DbPool};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
    pub policy_path: PathBuf,
    _tempdir: tempfile::TempDir,
}

fn test_config(dev_mode: bool) -> RuntimeConfig {
    RuntimeConfig {
        db_url: "sqlite::memory:".to_string(),
        policy_path: PathBuf::new(),
        dev_mode,
        jwt_secret: None,
        jwt_alg: "HS256".to_string(),
        jwt_verify: false,
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        idempotency_ttl: Duration::from_secs(24 * 3600),
        idempotency_cleanup_interval: Duration::from_secs(3600),
        connector_name: "mock".to_string(),
    }
}

/// Build a test app from a policy document and dev-mode switch. The policy
/// is written to a real temp file so hot-reload (mtime) behavior is
/// exercised faithfully rather than bypassed.
pub async fn build_app(policy: PolicyDocument, dev_mode: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let policy_path = dir.path().join("policy.yaml");
    let store = PolicyStore::new(&policy_path);
    store.save(&policy).expect("save seed policy");

    let db = init_test_db().await.expect("init test db");
    let mut config = test_config(dev_mode);
    config.policy_path = policy_path.clone();

    let state = Arc::new(govrun_server::state::AppState { db: db.clone(), policy: store, config });
    let router = govrun_server::build_router(state);

    TestApp {
        router,
        db,
        policy_path,
        _tempdir: dir,
    }
}

impl TestApp {
    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.expect("router call")
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
