//! Pending-action lifecycle over HTTP: materialize, supersede on
//! rematerialize, the approve-then-execute happy path, and the
//! transition-violation guard when execute is attempted before approval.

mod support;

use axum::http::StatusCode;
use govrun_core::policy::PolicyDocument;
use govrun_core::storage::cases;
use serde_json::json;
use support::{body_json, build_app, json_request};

fn policy_with_roles() -> PolicyDocument {
    let mut policy = PolicyDocument::default();
    policy
        .rbac
        .permissions
        .execute
        .insert("operator".to_string(), vec!["UpdateCardStatus".to_string()]);
    policy
        .rbac
        .permissions
        .approve
        .insert("supervisor".to_string(), vec!["UpdateCardStatus".to_string()]);
    policy.rbac.channels.insert("operator".to_string(), "operator".to_string());
    policy.rbac.channels.insert("supervisor".to_string(), "supervisor".to_string());
    policy
}

#[tokio::test]
async fn execute_before_approval_is_rejected_then_succeeds_after_approval() {
    let app = build_app(policy_with_roles(), false).await;
    cases::upsert(&app.db, "case-1", "res-1", 10, 0.5, "open", &json!([])).await.unwrap();
    govrun_core::storage::cards::upsert(&app.db, "card-1", "case-1", "todo").await.unwrap();

    let materialize = app
        .request(json_request(
            "POST",
            "/pending_actions",
            json!({
                "case_id": "case-1",
                "card_id": "card-1",
                "objective": "route update",
                "source": "nova",
                "proposed_actions": [
                    {"action_type": "UpdateCardStatus", "payload": {"card_id": "card-1", "new_status": "in_progress"}, "rationale": "routine"}
                ],
            }),
        ))
        .await;
    assert_eq!(materialize.status(), StatusCode::OK);
    let materialize_body = body_json(materialize).await;
    let pending_id = materialize_body["pending_actions"][0]["pending_id"].as_str().unwrap().to_string();
    assert_eq!(materialize_body["pending_actions"][0]["status"], "pending");

    let mut exec_req = json_request("POST", &format!("/pending_actions/{pending_id}/execute"), json!({}));
    exec_req.headers_mut().insert("x-channel", "operator".parse().unwrap());
    let premature = app.request(exec_req).await;
    assert_eq!(premature.status(), StatusCode::CONFLICT);

    let mut decide_req = json_request(
        "PATCH",
        &format!("/pending_actions/{pending_id}/decision"),
        json!({"decision": "approve"}),
    );
    decide_req.headers_mut().insert("x-channel", "supervisor".parse().unwrap());
    let decided = app.request(decide_req).await;
    assert_eq!(decided.status(), StatusCode::OK);
    let decided_body = body_json(decided).await;
    assert_eq!(decided_body["pending_action"]["status"], "approved");

    let mut exec_req2 = json_request("POST", &format!("/pending_actions/{pending_id}/execute"), json!({}));
    exec_req2.headers_mut().insert("x-channel", "operator".parse().unwrap());
    let executed = app.request(exec_req2).await;
    assert_eq!(executed.status(), StatusCode::OK);
    let executed_body = body_json(executed).await;
    assert_eq!(executed_body["pending_action"]["status"], "executed");

    let card = govrun_core::storage::cards::get(&app.db, "card-1").await.unwrap().unwrap();
    assert_eq!(card.status, "in_progress");
}

#[tokio::test]
async fn rematerialize_supersedes_prior_pending_rows_for_the_card() {
    let app = build_app(policy_with_roles(), false).await;
    cases::upsert(&app.db, "case-1", "res-1", 10, 0.5, "open", &json!([])).await.unwrap();
    govrun_core::storage::cards::upsert(&app.db, "card-1", "case-1", "todo").await.unwrap();

    let first = app
        .request(json_request(
            "POST",
            "/pending_actions",
            json!({
                "case_id": "case-1",
                "card_id": "card-1",
                "proposed_actions": [{"action_type": "RecordNote", "payload": {}, "rationale": "r1"}],
            }),
        ))
        .await;
    let first_body = body_json(first).await;
    let first_pending_id = first_body["pending_actions"][0]["pending_id"].as_str().unwrap().to_string();

    let mut second_req = json_request(
        "POST",
        "/pending_actions",
        json!({
            "case_id": "case-1",
            "card_id": "card-1",
            "proposed_actions": [{"action_type": "RecordNote", "payload": {"v": 2}, "rationale": "r2"}],
        }),
    );
    second_req.headers_mut().insert("idempotency-key", "different-scope".parse().unwrap());
    let second = app.request(second_req).await;
    let second_body = body_json(second).await;
    assert_eq!(second_body["superseded_pending_ids"].as_array().unwrap().len(), 1);
    assert_eq!(second_body["superseded_pending_ids"][0], first_pending_id);

    let first_row = app
        .request(support::empty_request("GET", &format!("/pending_actions/{first_pending_id}")))
        .await;
    let first_row_body = body_json(first_row).await;
    assert_eq!(first_row_body["status"], "canceled");
}

#[tokio::test]
async fn get_unknown_pending_action_is_404() {
    let app = build_app(policy_with_roles(), false).await;
    let response = app.request(support::empty_request("GET", "/pending_actions/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
