//! `POST /actions/execute`: the direct execution
//! surface, gated by RBAC and the global idempotency store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use govrun_core::audit::with_audit;
use govrun_core::idempotency::{self, ReplayOutcome};
use govrun_core::rbac::can_execute;
use govrun_core::storage::{actions, cases};

use crate::error::ApiError;
use crate::request_context::{actor_for_request, envelope_for_request, resolve_channel, resolve_request_id};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteActionRequest {
    pub case_id: String,
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /actions/execute`. Returns 200 for both successful and
/// guardrail-blocked outcomes (`ok:false`/`blocked:true` in the body), 403
/// only when RBAC itself denies the request, and 409 on an idempotency-key
/// conflict.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExecuteActionRequest>,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let channel = resolve_channel(&headers);
    let policy = state
        .policy
        .load()
        .map_err(|e| ApiError::from_policy(e, &request_id))?;
    let actor = actor_for_request(&state, &policy, &headers, &channel);

    let case = cases::get(&state.db, &body.case_id)
        .await
        .map_err(|e| ApiError::from_storage(e, &request_id))?
        .ok_or_else(|| ApiError::not_found(format!("case not found: {}", body.case_id), &request_id))?;

    let envelope = envelope_for_request(
        &policy,
        &actor,
        &headers,
        "POST",
        "/actions/execute",
        &HashMap::new(),
        &request_id,
        None,
    );

    if let Err(reason) = can_execute(
        &policy,
        &channel,
        &body.action_type,
        Some(&body.payload),
        Some(&actor.role),
        Some(case.risk_score as f64),
    ) {
        if !body.dry_run {
            let audit_payload = with_audit(
                &json!({"case_id": body.case_id, "action_type": body.action_type, "reason": format!("rbac: {reason}")}),
                &envelope,
            );
            if let Err(err) = actions::insert(
                &state.db,
                &body.case_id,
                &channel,
                "ActionExecuteDenied",
                &audit_payload,
                &format!("blocked: rbac: {reason}"),
            )
            .await
            {
                tracing::warn!(error = %err, "best-effort audit write failed");
            }
        }
        return Err(ApiError::forbidden(reason, request_id));
    }

    let idempotency_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(str::to_string);
    let req_hash = idempotency::request_hash(&json!({
        "case_id": body.case_id,
        "action_type": body.action_type,
        "payload": body.payload,
        "channel": channel,
    }))
    .unwrap_or_default();

    if !body.dry_run {
        if let Some(key) = &idempotency_key {
            match idempotency::check_or_replay(&state.db, key, &req_hash)
                .await
                .map_err(|e| ApiError::from_storage(e, &request_id))?
            {
                ReplayOutcome::Replay(response) => return Ok(Json(response)),
                ReplayOutcome::Conflict => {
                    return Err(ApiError::conflict("Idempotency-Key reuse with different payload", request_id));
                }
                ReplayOutcome::Fresh => {}
            }
        }
    }

    let mut payload = body.payload.clone();
    if payload.is_null() {
        payload = Value::Object(serde_json::Map::new());
    }
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("_actor".to_string(), serde_json::to_value(&actor).unwrap_or(Value::Null));
    }
    let payload = with_audit(&payload, &envelope);

    let outcome = govrun_core::execution::execute_action(
        &state.db,
        &policy,
        &body.case_id,
        &channel,
        &body.action_type,
        &payload,
        body.dry_run,
        &state.config.connector_name,
        &request_id,
    )
    .await
    .map_err(|e| ApiError::from_storage(e, &request_id))?;

    let response = serde_json::to_value(&outcome).unwrap_or(Value::Null);

    if !body.dry_run {
        if let Some(key) = &idempotency_key {
            idempotency::store(&state.db, key, &req_hash, &response)
                .await
                .map_err(|e| ApiError::from_storage(e, request_id))?;
        }
    }

    Ok(Json(response))
}
