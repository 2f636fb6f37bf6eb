//! `POST /actions/execute`: idempotency replay/conflict, the resolve
//! approval gate, and action-payload-rule enforcement.

mod support;

use axum::http::StatusCode;
use govrun_core::policy::types::{ActionPayloadRule, ApprovalGatePolicy, ResolveGate};
use govrun_core::policy::{Matcher, PolicyDocument};
use govrun_core::storage::cases;
use serde_json::json;
use support::{body_json, build_app, json_request};

fn policy_with_execute_role(role: &str, action_type: &str) -> PolicyDocument {
    let mut policy = PolicyDocument::default();
    policy
        .rbac
        .permissions
        .execute
        .insert(role.to_string(), vec![action_type.to_string()]);
    policy.rbac.channels.insert(role.to_string(), role.to_string());
    policy
}

#[tokio::test]
async fn idempotency_replay_returns_identical_body_and_conflict_on_payload_change() {
    let policy = policy_with_execute_role("api", "UpdateCardStatus");
    let app = build_app(policy, false).await;
    cases::upsert(&app.db, "c1", "res-1", 10, 0.5, "open", &json!([])).await.unwrap();

    let mut req = json_request(
        "POST",
        "/actions/execute",
        json!({"case_id": "c1", "action_type": "UpdateCardStatus", "channel": "api", "payload": {"x": 1}}),
    );
    req.headers_mut().insert("idempotency-key", "k1".parse().unwrap());
    req.headers_mut().insert("x-channel", "api".parse().unwrap());
    let first = app.request(req).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;

    let mut req2 = json_request(
        "POST",
        "/actions/execute",
        json!({"case_id": "c1", "action_type": "UpdateCardStatus", "channel": "api", "payload": {"x": 1}}),
    );
    req2.headers_mut().insert("idempotency-key", "k1".parse().unwrap());
    req2.headers_mut().insert("x-channel", "api".parse().unwrap());
    let second = app.request(req2).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_json(second).await;
    assert_eq!(first_body, second_body);

    let mut req3 = json_request(
        "POST",
        "/actions/execute",
        json!({"case_id": "c1", "action_type": "UpdateCardStatus", "channel": "api", "payload": {"x": 999}}),
    );
    req3.headers_mut().insert("idempotency-key", "k1".parse().unwrap());
    req3.headers_mut().insert("x-channel", "api".parse().unwrap());
    let third = app.request(req3).await;
    assert_eq!(third.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn resolve_requires_supervisor_channel_and_high_risk_case() {
    let mut policy = policy_with_execute_role("ui", "UpdateCardStatus");
    policy
        .rbac
        .permissions
        .execute
        .insert("supervisor".to_string(), vec!["UpdateCardStatus".to_string()]);
    policy.rbac.channels.insert("supervisor".to_string(), "supervisor".to_string());
    policy.action_approval_policy.approval_gate = ApprovalGatePolicy {
        resolve: Some(ResolveGate {
            require_channel: Some("supervisor".to_string()),
            require_high_risk_case: Some(true),
            high_risk_threshold: Some(80),
        }),
    };
    let app = build_app(policy, false).await;
    cases::upsert(&app.db, "c1", "res-1", 85, 0.9, "open", &json!([])).await.unwrap();
    govrun_core::storage::cards::upsert(&app.db, "card-1", "c1", "in_progress").await.unwrap();

    let payload = json!({
        "case_id": "c1",
        "action_type": "UpdateCardStatus",
        "payload": {"card_id": "card-1", "new_status": "resolved", "resolved_at": "2026-07-28T00:00:00Z"},
    });

    // The resolve gate is a guardrail (enforced inside the execution
    // pipeline against case/card state), not an RBAC permission — so a
    // channel that is otherwise allowed to execute UpdateCardStatus still
    // gets a 200 with `ok:false, blocked:true` rather than a 403.
    let mut ui_req = json_request("POST", "/actions/execute", payload.clone());
    ui_req.headers_mut().insert("x-channel", "ui".parse().unwrap());
    let ui_response = app.request(ui_req).await;
    assert_eq!(ui_response.status(), StatusCode::OK);
    let ui_body = body_json(ui_response).await;
    assert_eq!(ui_body["ok"], false);
    assert_eq!(ui_body["blocked"], true);
    assert!(ui_body["message"].as_str().unwrap().contains("supervisor"));

    let mut sup_req = json_request("POST", "/actions/execute", payload);
    sup_req.headers_mut().insert("x-channel", "supervisor".parse().unwrap());
    let sup_response = app.request(sup_req).await;
    assert_eq!(sup_response.status(), StatusCode::OK);
    let body = body_json(sup_response).await;
    assert_eq!(body["ok"], true);

    let audit = app.request(support::empty_request("GET", "/audit/by_case/c1")).await;
    let audit_body = body_json(audit).await;
    assert!(!audit_body["actions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn payload_rule_requires_risk_threshold_on_resolve() {
    let mut policy = policy_with_execute_role("api", "UpdateCardStatus");
    let mut when = std::collections::HashMap::new();
    when.insert("new_status".to_string(), Matcher::Scalar(json!("resolved")));
    policy.rbac.action_payload_rules.push(ActionPayloadRule {
        action_type: "UpdateCardStatus".to_string(),
        when,
        require_roles: None,
        deny_roles: None,
        require_risk_ge: Some(80),
        reason: Some("resolve requires high risk".to_string()),
    });
    let app = build_app(policy, false).await;
    cards_and_case(&app, "c-low", 10).await;
    cards_and_case(&app, "c-high", 90).await;

    let low = app
        .request(exec_resolve_request("c-low", "card-c-low"))
        .await;
    assert_eq!(low.status(), StatusCode::FORBIDDEN);
    let low_body = body_json(low).await;
    assert!(low_body["error"]["message"].as_str().unwrap().contains("payload rule"));

    let high = app.request(exec_resolve_request("c-high", "card-c-high")).await;
    assert_eq!(high.status(), StatusCode::OK);
}

async fn cards_and_case(app: &support::TestApp, case_id: &str, risk: i64) {
    cases::upsert(&app.db, case_id, "res-1", risk, 0.5, "open", &json!([])).await.unwrap();
    let card_id = format!("card-{case_id}");
    govrun_core::storage::cards::upsert(&app.db, &card_id, case_id, "in_progress").await.unwrap();
}

fn exec_resolve_request(case_id: &str, card_id: &str) -> axum::http::Request<axum::body::Body> {
    let mut req = json_request(
        "POST",
        "/actions/execute",
        json!({
            "case_id": case_id,
            "action_type": "UpdateCardStatus",
            "payload": {"card_id": card_id, "new_status": "resolved", "resolved_at": "2026-07-28T00:00:00Z"},
        }),
    );
    req.headers_mut().insert("x-channel", "api".parse().unwrap());
    req
}
