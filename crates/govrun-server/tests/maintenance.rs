//! Dev-mode maintenance endpoints: cleanup gating and idempotency status.

mod support;

use axum::http::StatusCode;
use govrun_core::policy::PolicyDocument;
use govrun_core::storage::materializations;
use serde_json::json;
use support::{body_json, build_app, empty_request};

#[tokio::test]
async fn cleanup_requires_dev_mode() {
    let app = build_app(PolicyDocument::default(), false).await;
    let response = app.request(empty_request("POST", "/maintenance/cleanup")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "dev_mode_required");
}

#[tokio::test]
async fn status_requires_dev_mode() {
    let app = build_app(PolicyDocument::default(), false).await;
    let response = app.request(empty_request("GET", "/maintenance/status")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_reports_idempotency_policy_when_dev_mode() {
    let app = build_app(PolicyDocument::default(), true).await;
    let response = app.request(empty_request("GET", "/maintenance/status")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["idempotency_policy"]["enabled"], json!(true));
}

#[tokio::test]
async fn cleanup_deletes_materializations_older_than_override_ttl() {
    let app = build_app(PolicyDocument::default(), true).await;
    materializations::create(&app.db, "/demo/materialize", "u1", "card-1", "case-1", "idem-1", "hash-1", "", "nova", 9999)
        .await
        .unwrap();
    sqlx::query("UPDATE materializations SET created_at = '2000-01-01T00:00:00Z'")
        .execute(&app.db)
        .await
        .unwrap();

    let response = app.request(empty_request("POST", "/maintenance/cleanup?ttl_hours=1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["deleted_count"], json!(1));
    assert_eq!(body["ttl_hours"], json!(1));
}
