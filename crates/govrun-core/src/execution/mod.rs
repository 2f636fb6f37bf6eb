//! Execution pipeline: guardrails, connector dispatch,
//! and the audit row write. The single place state actually changes.

pub mod connector;

use serde::Serialize;
use serde_json::Value;

use crate::audit::{build_internal_envelope, with_audit};
use crate::policy::types::PolicyDocument;
use crate::storage::{actions, cards, cases, DbPool};

use connector::get_connector;

/// `execute_action` result shape: `{ok, action_id?,
/// connector?, message, data?, dry_run?, would_execute?, blocked?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_execute: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

fn get_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.as_object().and_then(|o| o.get(key)).and_then(Value::as_str)
}

/// Guardrail outcome: pass, or a `blocked:` message.
async fn run_guardrails(
    pool: &DbPool,
    policy: &PolicyDocument,
    case_id: &str,
    channel: &str,
    action_type: &str,
    payload: &Value,
) -> Result<Result<(), String>, crate::error::StorageError> {
    if let Some(qty) = payload.as_object().and_then(|o| o.get("qty")) {
        let numeric = qty.as_f64();
        match numeric {
            Some(v) if v >= 0.0 => {}
            Some(_) => return Ok(Err("blocked: qty must be >= 0".to_string())),
            None => return Ok(Err("blocked: qty must be numeric".to_string())),
        }
    }

    if action_type != "UpdateCardStatus" {
        return Ok(Ok(()));
    }

    let Some(card_id) = get_str(payload, "card_id") else {
        return Ok(Err("blocked: payload.card_id is required".to_string()));
    };
    let Some(new_status) = get_str(payload, "new_status") else {
        return Ok(Err(
            "blocked: payload.new_status must be one of todo|in_progress|blocked|resolved".to_string(),
        ));
    };
    if !["todo", "in_progress", "blocked", "resolved"].contains(&new_status) {
        return Ok(Err(
            "blocked: payload.new_status must be one of todo|in_progress|blocked|resolved".to_string(),
        ));
    }

    let Some(card) = cards::get(pool, card_id).await? else {
        return Ok(Err(format!("blocked: card not found: {card_id}")));
    };
    if card.case_id != case_id {
        return Ok(Err("blocked: card.case_id must match request.case_id".to_string()));
    }

    if new_status == card.status {
        return Ok(Ok(()));
    }

    let allowed = policy
        .card_status_policy
        .allowed_transitions
        .get(&card.status)
        .cloned()
        .unwrap_or_default();
    if !allowed.iter().any(|s| s == new_status) {
        return Ok(Err(format!(
            "blocked: illegal card status transition {} -> {new_status}",
            card.status
        )));
    }

    if new_status == "blocked"
        && policy.card_status_policy.require_blocked_reason
        && get_str(payload, "blocked_reason").is_none()
    {
        return Ok(Err(
            "blocked: blocked_reason is required when new_status='blocked'".to_string(),
        ));
    }

    if new_status == "resolved" {
        if get_str(payload, "resolved_at").is_none() {
            return Ok(Err(
                "blocked: resolved_at is required when new_status='resolved' (ISO 8601)".to_string(),
            ));
        }

        if let Some(gate) = &policy.action_approval_policy.approval_gate.resolve {
            if let Some(required_channel) = &gate.require_channel {
                if channel != required_channel {
                    return Ok(Err(format!(
                        "blocked: resolving a card requires channel='{required_channel}'"
                    )));
                }
            }
            if gate.require_high_risk_case.unwrap_or(false) {
                let threshold = gate.high_risk_threshold.unwrap_or(0);
                let Some(case) = cases::get(pool, case_id).await? else {
                    return Ok(Err("blocked: case not found".to_string()));
                };
                if case.risk_score < i64::from(threshold) {
                    return Ok(Err(format!(
                        "blocked: resolving a card requires a high-risk case (risk_score >= {threshold})"
                    )));
                }
            }
        }
    }

    Ok(Ok(()))
}

fn ensure_audit_envelope(policy: &PolicyDocument, payload: &Value, request_id: &str) -> Value {
    if payload.as_object().is_some_and(|o| o.contains_key("_audit")) {
        return payload.clone();
    }
    let actor_value = payload
        .as_object()
        .and_then(|o| o.get("_actor"))
        .cloned()
        .unwrap_or(Value::Object(serde_json::Map::new()));
    let envelope = build_internal_envelope(policy, actor_value, "internal:execute_action", request_id);
    with_audit(payload, &envelope)
}

/// `execute_action`. `request_id` seeds the internal audit
/// envelope when `payload` doesn't already carry one.
#[allow(clippy::too_many_arguments)]
pub async fn execute_action(
    pool: &DbPool,
    policy: &PolicyDocument,
    case_id: &str,
    channel: &str,
    action_type: &str,
    payload: &Value,
    dry_run: bool,
    connector_name: &str,
    request_id: &str,
) -> Result<ExecutionOutcome, crate::error::StorageError> {
    let payload = ensure_audit_envelope(policy, payload, request_id);
    let guardrails = run_guardrails(pool, policy, case_id, channel, action_type, &payload).await?;

    if dry_run {
        return Ok(match guardrails {
            Err(message) => ExecutionOutcome {
                ok: false,
                action_id: None,
                connector: None,
                message,
                data: None,
                dry_run: Some(true),
                would_execute: None,
                blocked: Some(true),
            },
            Ok(()) => {
                let would_execute = if action_type == "UpdateCardStatus" {
                    serde_json::json!({
                        "connector": "local_db",
                        "update": {
                            "card_id": get_str(&payload, "card_id"),
                            "new_status": get_str(&payload, "new_status"),
                        },
                    })
                } else {
                    serde_json::json!({"connector": connector_name, "action_type": action_type})
                };
                ExecutionOutcome {
                    ok: true,
                    action_id: None,
                    connector: None,
                    message: "ok (dry_run)".to_string(),
                    data: None,
                    dry_run: Some(true),
                    would_execute: Some(would_execute),
                    blocked: None,
                }
            }
        });
    }

    if let Err(message) = guardrails {
        let action_id = actions::insert(pool, case_id, channel, action_type, &payload, &message).await?;
        return Ok(ExecutionOutcome {
            ok: false,
            action_id: Some(action_id),
            connector: None,
            message,
            data: None,
            dry_run: None,
            would_execute: None,
            blocked: Some(true),
        });
    }

    if action_type == "UpdateCardStatus" {
        let card_id = get_str(&payload, "card_id").unwrap_or_default().to_string();
        let new_status = get_str(&payload, "new_status").unwrap_or_default().to_string();
        let blocked_reason = get_str(&payload, "blocked_reason");
        let resolved_at = get_str(&payload, "resolved_at")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let updated = cards::apply_status_update(pool, &card_id, &new_status, blocked_reason, resolved_at).await?;
        let message = format!("card status updated -> {new_status}");
        let action_id = actions::insert(pool, case_id, channel, action_type, &payload, &message).await?;

        return Ok(ExecutionOutcome {
            ok: true,
            action_id: Some(action_id),
            connector: Some("local_db".to_string()),
            message,
            data: Some(serde_json::json!({
                "card_id": updated.card_id,
                "status": updated.status,
                "blocked_reason": updated.blocked_reason,
                "resolved_at": updated.resolved_at,
            })),
            dry_run: None,
            would_execute: None,
            blocked: None,
        });
    }

    let connector = get_connector(connector_name);
    let result = connector.execute(action_type, &payload).await;
    let action_id = actions::insert(pool, case_id, channel, action_type, &payload, &result.message).await?;

    Ok(ExecutionOutcome {
        ok: result.ok,
        action_id: Some(action_id),
        connector: Some(connector.name().to_string()),
        message: result.message,
        data: Some(result.data),
        dry_run: None,
        would_execute: None,
        blocked: if result.ok { None } else { Some(true) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{cards as cards_storage, cases as cases_storage, init_test_db};
    use serde_json::json;

    #[tokio::test]
    async fn update_card_status_idempotent_noop_returns_ok() {
        let pool = init_test_db().await.unwrap();
        cases_storage::upsert(&pool, "case-1", "res-1", 10, 0.5, "open", &json!({}))
            .await
            .unwrap();
        cards_storage::upsert(&pool, "card-1", "case-1", "todo").await.unwrap();

        let policy = PolicyDocument::default();
        let payload = json!({"card_id": "card-1", "new_status": "todo"});
        let outcome = execute_action(&pool, &policy, "case-1", "api", "UpdateCardStatus", &payload, false, "mock", "req-1")
            .await
            .unwrap();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn update_card_status_missing_card_blocks_without_mutation() {
        let pool = init_test_db().await.unwrap();
        cases_storage::upsert(&pool, "case-1", "res-1", 10, 0.5, "open", &json!({}))
            .await
            .unwrap();
        let policy = PolicyDocument::default();
        let payload = json!({"card_id": "missing", "new_status": "blocked", "blocked_reason": "x"});
        let outcome = execute_action(&pool, &policy, "case-1", "api", "UpdateCardStatus", &payload, false, "mock", "req-1")
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.blocked, Some(true));
        assert!(outcome.action_id.is_some());
    }

    #[tokio::test]
    async fn dry_run_never_mutates_or_writes_audit() {
        let pool = init_test_db().await.unwrap();
        cases_storage::upsert(&pool, "case-1", "res-1", 10, 0.5, "open", &json!({}))
            .await
            .unwrap();
        cards_storage::upsert(&pool, "card-1", "case-1", "todo").await.unwrap();
        let policy = PolicyDocument::default();
        let payload = json!({"card_id": "card-1", "new_status": "in_progress"});
        let outcome = execute_action(&pool, &policy, "case-1", "api", "UpdateCardStatus", &payload, true, "mock", "req-1")
            .await
            .unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.dry_run, Some(true));

        let card = cards_storage::get(&pool, "card-1").await.unwrap().unwrap();
        assert_eq!(card.status, "todo");
        let audit_rows = actions::recent(&pool, 10).await.unwrap();
        assert!(audit_rows.is_empty());
    }

    #[tokio::test]
    async fn unknown_connector_fails_closed_with_audit_row() {
        let pool = init_test_db().await.unwrap();
        cases_storage::upsert(&pool, "case-1", "res-1", 10, 0.5, "open", &json!({}))
            .await
            .unwrap();
        let policy = PolicyDocument::default();
        let payload = json!({});
        let outcome = execute_action(&pool, &policy, "case-1", "api", "ShipOrder", &payload, false, "sap", "req-1")
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.connector.as_deref(), Some("sap"));
        let audit_rows = actions::recent(&pool, 10).await.unwrap();
        assert_eq!(audit_rows.len(), 1);
    }
}
