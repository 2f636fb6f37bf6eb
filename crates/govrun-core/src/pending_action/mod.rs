//! Pending-action lifecycle state machine:
//! `decide()`, `execute()`, and supersede-on-rematerialize.

use serde::Serialize;
use serde_json::{json, Value};

use crate::audit::{with_audit, AuditEnvelope};
use crate::error::{PendingActionError, StorageError};
use crate::execution::execute_action;
use crate::idempotency::{request_hash, scoped_key};
use crate::policy::types::PolicyDocument;
use crate::rbac::{can_approve, can_execute};
use crate::storage::pending_actions::{self, PendingAction};
use crate::storage::{actions, cases, DbPool};

fn card_id_or_empty(pending: &PendingAction) -> String {
    pending.card_id.clone().unwrap_or_default()
}

async fn case_risk_score(pool: &DbPool, case_id: &str) -> Result<Option<f64>, StorageError> {
    Ok(cases::get(pool, case_id).await?.map(|c| c.risk_score as f64))
}

async fn audit_best_effort(
    pool: &DbPool,
    case_id: &str,
    channel: &str,
    action_type: &str,
    payload: &Value,
    result: &str,
) {
    if let Err(err) = actions::insert(pool, case_id, channel, action_type, payload, result).await {
        tracing::warn!(error = %err, action_type, "best-effort audit write failed");
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Serialize)]
pub struct DecideOutcome {
    pub pending_action: PendingAction,
    /// `true` if this call observed a prior decision and returned its
    /// current state instead of applying a new one.
    pub replayed: bool,
}

/// `decide(pending_id, decision, note, channel, idempotency_key?)`. `subject` is the resolved actor's identity used both for the
/// scoped idempotency key and `approved_by`.
#[allow(clippy::too_many_arguments)]
pub async fn decide(
    pool: &DbPool,
    policy: &PolicyDocument,
    pending_id: &str,
    decision: &str,
    note: Option<&str>,
    channel: &str,
    subject: &str,
    role: Option<&str>,
    idempotency_key: Option<&str>,
    envelope: &AuditEnvelope,
) -> Result<DecideOutcome, PendingActionError> {
    let pending = pending_actions::get(pool, pending_id)
        .await?
        .ok_or_else(|| PendingActionError::NotFound(pending_id.to_string()))?;

    let new_status = match decision {
        "approve" => "approved",
        "reject" => "rejected",
        other => return Err(PendingActionError::Forbidden(format!("unknown decision '{other}'"))),
    };

    let req_hash = request_hash(&json!({"decision": decision, "note": note.unwrap_or(""), "channel": channel}))
        .unwrap_or_default();
    let card_id = card_id_or_empty(&pending);
    let scoped_idem = idempotency_key.map(|k| scoped_key("/pending_actions/decision", subject, &card_id, k));

    if let Some(scoped) = &scoped_idem {
        if pending.decision_idempotency_key.as_deref() == Some(scoped.as_str()) {
            if let Some(stored_hash) = &pending.decision_request_hash {
                if stored_hash != &req_hash {
                    let payload = with_audit(
                        &json!({
                            "endpoint": "/pending_actions/decision",
                            "subject": subject,
                            "card_id": card_id,
                            "pending_id": pending_id,
                            "expected_request_hash": stored_hash,
                            "received_request_hash": req_hash,
                        }),
                        envelope,
                    );
                    audit_best_effort(
                        pool,
                        &pending.case_id,
                        "system",
                        "IdempotencyConflict",
                        &payload,
                        "blocked: Idempotency-Key reuse with different payload",
                    )
                    .await;
                    return Err(PendingActionError::IdempotencyConflict);
                }
            }
            if matches!(pending.status.as_str(), "approved" | "rejected") {
                return Ok(DecideOutcome {
                    pending_action: pending,
                    replayed: true,
                });
            }
        }
    }

    let risk = case_risk_score(pool, &pending.case_id).await?;
    if let Err(reason) = can_approve(
        policy,
        channel,
        &pending.action_type,
        role,
        Some(&pending.action_payload()),
        risk,
    ) {
        let payload = with_audit(
            &json!({"pending_id": pending_id, "from_status": pending.status, "to_status": "(decision)", "reason": format!("rbac: {reason}")}),
            envelope,
        );
        audit_best_effort(
            pool,
            &pending.case_id,
            channel,
            "PendingActionTransitionViolation",
            &payload,
            &format!("blocked: rbac: {reason}"),
        )
        .await;
        return Err(PendingActionError::Forbidden(reason));
    }

    let allowed = policy
        .pending_action_policy
        .allowed_transitions
        .get(&pending.status)
        .cloned()
        .unwrap_or_default();
    if !allowed.iter().any(|s| s == new_status) {
        let payload = with_audit(
            &json!({"pending_id": pending_id, "from_status": pending.status, "to_status": new_status, "reason": format!("illegal transition {} -> {new_status}", pending.status)}),
            envelope,
        );
        audit_best_effort(
            pool,
            &pending.case_id,
            channel,
            "PendingActionTransitionViolation",
            &payload,
            &format!("blocked: illegal transition {} -> {new_status}", pending.status),
        )
        .await;
        return Err(PendingActionError::IllegalTransition {
            from: pending.status.clone(),
            to: new_status.to_string(),
        });
    }

    let updated = pending_actions::apply_decision(
        pool,
        pending_id,
        new_status,
        Some(subject),
        note.filter(|n| !n.is_empty()),
        scoped_idem.as_deref(),
        &req_hash,
    )
    .await?;

    let audit_payload = with_audit(
        &json!({"pending_id": pending_id, "decision": decision, "note": note.unwrap_or(""), "idempotency_key_scoped": scoped_idem}),
        envelope,
    );
    audit_best_effort(
        pool,
        &pending.case_id,
        channel,
        "DecidePendingAction",
        &audit_payload,
        &format!("ok: {new_status}"),
    )
    .await;

    Ok(DecideOutcome {
        pending_action: updated,
        replayed: false,
    })
}

/// Outcome of [`execute`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOutcome {
    pub pending_action: PendingAction,
    pub dry_run: bool,
    pub replayed: bool,
    pub execution: Value,
}

/// `execute(pending_id, dry_run, channel, idempotency_key?)`.
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    pool: &DbPool,
    policy: &PolicyDocument,
    pending_id: &str,
    dry_run: bool,
    channel: &str,
    subject: &str,
    role: Option<&str>,
    actor_value: Value,
    idempotency_key: Option<&str>,
    connector_name: &str,
    request_id: &str,
    envelope: &AuditEnvelope,
) -> Result<ExecuteOutcome, PendingActionError> {
    let pending = pending_actions::get(pool, pending_id)
        .await?
        .ok_or_else(|| PendingActionError::NotFound(pending_id.to_string()))?;

    let exec_req_hash =
        request_hash(&json!({"pending_id": pending_id, "dry_run": dry_run, "channel": channel})).unwrap_or_default();
    let card_id = card_id_or_empty(&pending);
    let scoped_idem = idempotency_key.map(|k| scoped_key("/pending_actions/execute", subject, &card_id, k));

    if let Some(scoped) = &scoped_idem {
        if pending.execution_idempotency_key.as_deref() == Some(scoped.as_str()) {
            if let Some(stored_hash) = &pending.execution_request_hash {
                if stored_hash != &exec_req_hash {
                    let payload = with_audit(
                        &json!({
                            "endpoint": "/pending_actions/execute",
                            "subject": subject,
                            "card_id": card_id,
                            "pending_id": pending_id,
                            "expected_request_hash": stored_hash,
                            "received_request_hash": exec_req_hash,
                        }),
                        envelope,
                    );
                    audit_best_effort(
                        pool,
                        &pending.case_id,
                        "system",
                        "IdempotencyConflict",
                        &payload,
                        "blocked: Idempotency-Key reuse with different payload",
                    )
                    .await;
                    return Err(PendingActionError::IdempotencyConflict);
                }
            }
            if matches!(pending.status.as_str(), "executed" | "blocked") {
                return Ok(ExecuteOutcome {
                    execution: json!({
                        "ok": pending.status == "executed",
                        "message": pending.execution_result.clone().unwrap_or_default(),
                        "action_id": pending.executed_action_id.clone(),
                    }),
                    dry_run: false,
                    replayed: true,
                    pending_action: pending,
                });
            }
        }
    }

    let risk = case_risk_score(pool, &pending.case_id).await?;
    if let Err(reason) = can_execute(
        policy,
        channel,
        &pending.action_type,
        Some(&pending.action_payload()),
        role,
        risk,
    ) {
        if !dry_run {
            let payload = with_audit(
                &json!({"pending_id": pending_id, "from_status": pending.status, "to_status": "(execute)", "reason": format!("rbac: {reason}")}),
                envelope,
            );
            audit_best_effort(
                pool,
                &pending.case_id,
                channel,
                "PendingActionTransitionViolation",
                &payload,
                &format!("blocked: rbac: {reason}"),
            )
            .await;
        }
        return Err(PendingActionError::Forbidden(reason));
    }

    if pending.approval_required && pending.status != "approved" {
        if !dry_run {
            let payload = with_audit(
                &json!({"pending_id": pending_id, "from_status": pending.status, "to_status": "executed", "reason": "execution attempted without approval"}),
                envelope,
            );
            audit_best_effort(
                pool,
                &pending.case_id,
                channel,
                "PendingActionTransitionViolation",
                &payload,
                "blocked: execution attempted without approval",
            )
            .await;
        }
        return Err(PendingActionError::ApprovalRequired);
    }

    let mut base_payload = pending.action_payload();
    if let Some(obj) = base_payload.as_object_mut() {
        obj.insert("_actor".to_string(), actor_value);
        obj.insert("materialization_id".to_string(), json!(pending.materialization_id.clone().unwrap_or_default()));
    }
    let payload = with_audit(&base_payload, envelope);

    let result = execute_action(
        pool,
        policy,
        &pending.case_id,
        channel,
        &pending.action_type,
        &payload,
        dry_run,
        connector_name,
        request_id,
    )
    .await?;

    let to_status = if result.ok { "executed" } else { "blocked" };
    let allowed = policy
        .pending_action_policy
        .allowed_transitions
        .get(&pending.status)
        .cloned()
        .unwrap_or_default();
    let transition_legal = allowed.iter().any(|s| s == to_status);

    if dry_run {
        if !transition_legal {
            return Err(PendingActionError::IllegalTransition {
                from: pending.status.clone(),
                to: to_status.to_string(),
            });
        }
        return Ok(ExecuteOutcome {
            execution: serde_json::to_value(&result).unwrap_or(Value::Null),
            dry_run: true,
            replayed: false,
            pending_action: pending,
        });
    }

    if !transition_legal {
        let payload = with_audit(
            &json!({"pending_id": pending_id, "from_status": pending.status, "to_status": to_status, "reason": format!("illegal transition {} -> {to_status}", pending.status)}),
            envelope,
        );
        audit_best_effort(
            pool,
            &pending.case_id,
            channel,
            "PendingActionTransitionViolation",
            &payload,
            &format!("blocked: illegal transition {} -> {to_status}", pending.status),
        )
        .await;
        return Err(PendingActionError::IllegalTransition {
            from: pending.status.clone(),
            to: to_status.to_string(),
        });
    }

    let updated = pending_actions::apply_execution(
        pool,
        pending_id,
        to_status,
        result.action_id.as_deref(),
        &result.message,
        scoped_idem.as_deref(),
        &exec_req_hash,
    )
    .await?;

    Ok(ExecuteOutcome {
        execution: serde_json::to_value(&result).unwrap_or(Value::Null),
        dry_run: false,
        replayed: false,
        pending_action: updated,
    })
}

/// Supersede every prior pending/approved row for `card_id` on fresh
/// materialization, and write the batched `SupersedePendingActions` audit
/// row.
pub async fn supersede_for_rematerialization(
    pool: &DbPool,
    policy: &PolicyDocument,
    case_id: &str,
    card_id: &str,
    new_materialization_id: &str,
    channel: &str,
    envelope: &AuditEnvelope,
) -> Result<Vec<String>, StorageError> {
    if !policy.materialization_policy.supersede_on_rematerialize {
        return Ok(Vec::new());
    }
    let superseded = pending_actions::supersede_for_card(
        pool,
        card_id,
        &policy.pending_action_policy.supersede_statuses,
        new_materialization_id,
    )
    .await?;

    if !superseded.is_empty() {
        let payload = with_audit(
            &json!({"card_id": card_id, "superseded_pending_ids": superseded, "materialization_id": new_materialization_id}),
            envelope,
        );
        audit_best_effort(
            pool,
            case_id,
            channel,
            "SupersedePendingActions",
            &payload,
            &format!("ok: superseded {} pending action(s)", superseded.len()),
        )
        .await;
    }

    Ok(superseded)
}

/// One generator-proposed action, materialized into a [`PendingAction`] row.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProposedAction {
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub rationale: String,
}

/// Outcome of [`materialize`].
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeOutcome {
    pub materialization_id: String,
    pub pending_actions: Vec<PendingAction>,
    pub superseded_pending_ids: Vec<String>,
    /// `true` if this call observed a prior materialization at the same
    /// scope and returned its existing pending actions unchanged.
    pub replayed: bool,
}

/// Turn a generator's proposed actions into [`PendingAction`] rows, scoped
/// by `(endpoint, subject, card_id, idempotency_key)`. Superseding prior pending actions for `card_id`
/// happens before the fresh rows are inserted. `connector_name` is the execution target passed to
/// approval inference for every non-`UpdateCardStatus` proposal.
#[allow(clippy::too_many_arguments)]
pub async fn materialize(
    pool: &DbPool,
    policy: &PolicyDocument,
    endpoint: &str,
    subject: &str,
    case_id: &str,
    card_id: &str,
    idempotency_key: &str,
    objective: &str,
    source: &str,
    proposed: &[ProposedAction],
    ttl_hours: u32,
    connector_name: &str,
    channel: &str,
    envelope: &AuditEnvelope,
) -> Result<MaterializeOutcome, PendingActionError> {
    use crate::storage::materializations;

    let req_hash = request_hash(&json!({
        "case_id": case_id,
        "card_id": card_id,
        "objective": objective,
        "proposed": proposed.iter().map(|p| json!({
            "action_type": p.action_type,
            "payload": p.payload,
            "rationale": p.rationale,
        })).collect::<Vec<_>>(),
    }))
    .unwrap_or_default();

    if !idempotency_key.is_empty() {
        if let Some(existing) = materializations::find_by_scope(pool, endpoint, subject, card_id, idempotency_key).await? {
            if existing.request_hash != req_hash {
                let payload = with_audit(
                    &json!({
                        "endpoint": endpoint,
                        "subject": subject,
                        "card_id": card_id,
                        "expected_request_hash": existing.request_hash,
                        "received_request_hash": req_hash,
                    }),
                    envelope,
                );
                audit_best_effort(
                    pool,
                    case_id,
                    "system",
                    "IdempotencyConflict",
                    &payload,
                    "blocked: Idempotency-Key reuse with different payload",
                )
                .await;
                return Err(PendingActionError::IdempotencyConflict);
            }
            let pending = pending_actions::list_by_materialization(pool, &existing.materialization_id).await?;
            return Ok(MaterializeOutcome {
                materialization_id: existing.materialization_id,
                pending_actions: pending,
                superseded_pending_ids: Vec::new(),
                replayed: true,
            });
        }
    }

    let materialization = materializations::create(
        pool,
        endpoint,
        subject,
        card_id,
        case_id,
        idempotency_key,
        &req_hash,
        objective,
        source,
        ttl_hours,
    )
    .await?;

    let superseded = supersede_for_rematerialization(
        pool,
        policy,
        case_id,
        card_id,
        &materialization.materialization_id,
        channel,
        envelope,
    )
    .await?;

    let mut created = Vec::with_capacity(proposed.len());
    for (rank, proposal) in proposed.iter().enumerate() {
        let execution_target = if proposal.action_type == "UpdateCardStatus" {
            "local_db"
        } else {
            connector_name
        };
        let approval_required = crate::approval::approval_required_for_action(
            policy,
            &proposal.action_type,
            &proposal.payload,
            execution_target,
        );
        let card_id_opt = if card_id.is_empty() { None } else { Some(card_id) };
        let row = pending_actions::create(
            pool,
            case_id,
            card_id_opt,
            Some(&materialization.materialization_id),
            &proposal.action_type,
            &proposal.payload,
            &proposal.rationale,
            rank as i64,
            approval_required,
        )
        .await?;
        created.push(row);
    }

    let audit_payload = with_audit(
        &json!({
            "materialization_id": materialization.materialization_id,
            "card_id": card_id,
            "pending_ids": created.iter().map(|p| p.pending_id.clone()).collect::<Vec<_>>(),
        }),
        envelope,
    );
    audit_best_effort(
        pool,
        case_id,
        channel,
        "MaterializePendingActions",
        &audit_payload,
        &format!("ok: materialized {} pending action(s)", created.len()),
    )
    .await;

    Ok(MaterializeOutcome {
        materialization_id: materialization.materialization_id,
        pending_actions: created,
        superseded_pending_ids: superseded,
        replayed: false,
    })
}
