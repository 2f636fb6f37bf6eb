//! Pending-action endpoints: list/get, materialize, decide, execute.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use govrun_core::pending_action::{self, ProposedAction};
use govrun_core::storage::pending_actions::{self, ListFilter};

use crate::error::ApiError;
use crate::request_context::{actor_for_request, envelope_for_request, resolve_channel, resolve_request_id};
use crate::state::AppState;

fn subject_for(actor: &govrun_core::identity::Actor) -> String {
    if !actor.sub.is_empty() {
        actor.sub.clone()
    } else if !actor.email.is_empty() {
        actor.email.clone()
    } else {
        "anonymous".to_string()
    }
}

fn idempotency_key_header(headers: &HeaderMap) -> Option<&str> {
    headers.get("idempotency-key").and_then(|v| v.to_str().ok())
}

fn row_json(row: &pending_actions::PendingAction) -> Value {
    let mut v = serde_json::to_value(row).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("action_payload".to_string(), row.action_payload());
    }
    v
}

/// `GET /pending_actions?case_id=&card_id=&status=&limit=`.
pub async fn list_pending_actions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let limit = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);
    let filter = ListFilter {
        case_id: query.get("case_id").map(String::as_str),
        card_id: query.get("card_id").map(String::as_str),
        status: query.get("status").map(String::as_str),
        limit,
    };
    let rows = pending_actions::list(&state.db, filter)
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    Ok(Json(json!({"pending_actions": rows.iter().map(row_json).collect::<Vec<_>>()})))
}

/// `GET /pending_actions/{id}`.
pub async fn get_pending_action(
    State(state): State<Arc<AppState>>,
    Path(pending_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let row = pending_actions::get(&state.db, &pending_id)
        .await
        .map_err(|e| ApiError::from_storage(e, &request_id))?
        .ok_or_else(|| ApiError::not_found(format!("pending action not found: {pending_id}"), request_id))?;
    Ok(Json(row_json(&row)))
}

#[derive(Debug, Deserialize)]
pub struct MaterializeRequest {
    pub case_id: String,
    #[serde(default)]
    pub card_id: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub source: String,
    pub proposed_actions: Vec<ProposedAction>,
}

/// `POST /pending_actions`.
pub async fn materialize_pending_actions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MaterializeRequest>,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let channel = resolve_channel(&headers);
    let policy = state
        .policy
        .load()
        .map_err(|e| ApiError::from_policy(e, &request_id))?;
    let actor = actor_for_request(&state, &policy, &headers, &channel);
    let subject = subject_for(&actor);
    let idempotency_key = idempotency_key_header(&headers).unwrap_or("");
    let envelope = envelope_for_request(
        &policy,
        &actor,
        &headers,
        "POST",
        "/pending_actions",
        &HashMap::new(),
        &request_id,
        None,
    );

    let outcome = pending_action::materialize(
        &state.db,
        &policy,
        "/pending_actions",
        &subject,
        &body.case_id,
        &body.card_id,
        idempotency_key,
        &body.objective,
        &body.source,
        &body.proposed_actions,
        policy.idempotency.materialization_ttl_hours,
        &state.config.connector_name,
        &channel,
        &envelope,
    )
    .await
    .map_err(|e| ApiError::from_pending_action(e, &request_id))?;

    Ok(Json(json!({
        "materialization_id": outcome.materialization_id,
        "pending_actions": outcome.pending_actions.iter().map(row_json).collect::<Vec<_>>(),
        "superseded_pending_ids": outcome.superseded_pending_ids,
        "replayed": outcome.replayed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// `PATCH /pending_actions/{id}/decision`.
pub async fn decide_pending_action(
    State(state): State<Arc<AppState>>,
    Path(pending_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let channel = resolve_channel(&headers);
    let policy = state
        .policy
        .load()
        .map_err(|e| ApiError::from_policy(e, &request_id))?;
    let actor = actor_for_request(&state, &policy, &headers, &channel);
    let subject = subject_for(&actor);
    let idempotency_key = idempotency_key_header(&headers);
    let envelope = envelope_for_request(
        &policy,
        &actor,
        &headers,
        "PATCH",
        "/pending_actions/{id}/decision",
        &HashMap::new(),
        &request_id,
        None,
    );

    let outcome = pending_action::decide(
        &state.db,
        &policy,
        &pending_id,
        &body.decision,
        body.note.as_deref(),
        &channel,
        &subject,
        Some(&actor.role),
        idempotency_key,
        &envelope,
    )
    .await
    .map_err(|e| ApiError::from_pending_action(e, request_id))?;

    Ok(Json(json!({
        "pending_action": row_json(&outcome.pending_action),
        "replayed": outcome.replayed,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /pending_actions/{id}/execute`.
pub async fn execute_pending_action(
    State(state): State<Arc<AppState>>,
    Path(pending_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ExecuteRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request_id = resolve_request_id(&headers);
    let channel = resolve_channel(&headers);
    let policy = state
        .policy
        .load()
        .map_err(|e| ApiError::from_policy(e, &request_id))?;
    let actor = actor_for_request(&state, &policy, &headers, &channel);
    let subject = subject_for(&actor);
    let idempotency_key = idempotency_key_header(&headers);
    let envelope = envelope_for_request(
        &policy,
        &actor,
        &headers,
        "POST",
        "/pending_actions/{id}/execute",
        &HashMap::new(),
        &request_id,
        None,
    );
    let actor_value = serde_json::to_value(&actor).unwrap_or(Value::Null);

    let outcome = pending_action::execute(
        &state.db,
        &policy,
        &pending_id,
        body.dry_run,
        &channel,
        &subject,
        Some(&actor.role),
        actor_value,
        idempotency_key,
        &state.config.connector_name,
        &request_id,
        &envelope,
    )
    .await
    .map_err(|e| ApiError::from_pending_action(e, request_id))?;

    Ok(Json(json!({
        "pending_action": row_json(&outcome.pending_action),
        "dry_run": outcome.dry_run,
        "replayed": outcome.replayed,
        "execution": outcome.execution,
    })))
}
