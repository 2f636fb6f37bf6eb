//! Admission middleware: request-id assignment/echo and the error envelope
//! shape for domain errors.

mod support;

use axum::http::StatusCode;
use govrun_core::policy::PolicyDocument;
use serde_json::json;
use support::{body_json, build_app, empty_request};

#[tokio::test]
async fn echoes_inbound_request_id_verbatim() {
    let app = build_app(PolicyDocument::default(), false).await;
    let mut req = empty_request("GET", "/healthz");
    req.headers_mut().insert("x-request-id", "my-request-id".parse().unwrap());

    let response = app.request(req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "my-request-id");
}

#[tokio::test]
async fn mints_a_request_id_when_absent() {
    let app = build_app(PolicyDocument::default(), false).await;
    let response = app.request(empty_request("GET", "/healthz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn not_found_case_returns_stable_error_envelope() {
    let app = build_app(PolicyDocument::default(), false).await;
    let response = app
        .request(support::json_request(
            "POST",
            "/actions/execute",
            json!({"case_id": "missing-case", "action_type": "UpdateCardStatus", "payload": {}}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("missing-case"));
    assert!(body["request_id"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn readyz_and_health_report_ok_against_a_live_pool() {
    let app = build_app(PolicyDocument::default(), false).await;
    for path in ["/healthz", "/health", "/readyz"] {
        let response = app.request(empty_request("GET", path)).await;
        assert_eq!(response.status(), StatusCode::OK, "path {path}");
    }
}
