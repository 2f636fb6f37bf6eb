//! Case read endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use govrun_core::storage::{actions, cases, pending_actions};

use crate::error::ApiError;
use crate::request_context::resolve_request_id;
use crate::state::AppState;

fn parse_limit(query: &HashMap<String, String>, default: i64) -> i64 {
    query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `GET /cases?status=&limit=`.
pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let status = query.get("status").map(String::as_str);
    let rows = cases::list(&state.db, status, parse_limit(&query, 100))
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    let cases_json: Vec<Value> = rows
        .iter()
        .map(|c| {
            let mut v = serde_json::to_value(c).unwrap_or(Value::Null);
            if let Some(obj) = v.as_object_mut() {
                obj.insert("root_signals".to_string(), c.root_signals());
            }
            v
        })
        .collect();
    Ok(Json(json!({"cases": cases_json})))
}

/// `GET /cases/{case_id}`.
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let case = cases::get(&state.db, &case_id)
        .await
        .map_err(|e| ApiError::from_storage(e, &request_id))?
        .ok_or_else(|| ApiError::not_found(format!("case not found: {case_id}"), request_id))?;
    let mut v = serde_json::to_value(&case).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("root_signals".to_string(), case.root_signals());
    }
    Ok(Json(v))
}

/// `GET /cases/{case_id}/actions?limit=` — audited actions for one case.
pub async fn case_actions(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    cases::get(&state.db, &case_id)
        .await
        .map_err(|e| ApiError::from_storage(e, &request_id))?
        .ok_or_else(|| ApiError::not_found(format!("case not found: {case_id}"), &request_id))?;

    let rows = actions::by_case(&state.db, &case_id, parse_limit(&query, 100))
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    let actions_json: Vec<Value> = rows
        .iter()
        .map(|a| {
            let mut v = serde_json::to_value(a).unwrap_or(Value::Null);
            if let Some(obj) = v.as_object_mut() {
                obj.insert("payload".to_string(), a.payload());
            }
            v
        })
        .collect();
    Ok(Json(json!({"actions": actions_json})))
}

/// `GET /cases/{case_id}/pending_actions?status=` — the pending actions
/// (and, equivalently, the generator's materialized recommendations) scoped
/// to this case.
pub async fn case_pending_actions(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    cases::get(&state.db, &case_id)
        .await
        .map_err(|e| ApiError::from_storage(e, &request_id))?
        .ok_or_else(|| ApiError::not_found(format!("case not found: {case_id}"), &request_id))?;

    let filter = pending_actions::ListFilter {
        case_id: Some(case_id.as_str()),
        card_id: None,
        status: query.get("status").map(String::as_str),
        limit: parse_limit(&query, 100),
    };
    let rows = pending_actions::list(&state.db, filter)
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    let pending_json: Vec<Value> = rows
        .iter()
        .map(|p| {
            let mut v = serde_json::to_value(p).unwrap_or(Value::Null);
            if let Some(obj) = v.as_object_mut() {
                obj.insert("action_payload".to_string(), p.action_payload());
            }
            v
        })
        .collect();
    Ok(Json(json!({"pending_actions": pending_json})))
}
