//! Audit trail read endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use govrun_core::storage::actions;

use crate::error::ApiError;
use crate::request_context::resolve_request_id;
use crate::state::AppState;

fn row_json(row: &actions::ActionRow) -> Value {
    let mut v = serde_json::to_value(row).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("payload".to_string(), row.payload());
    }
    v
}

/// `GET /audit/recent?limit=`.
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let limit = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);
    let rows = actions::recent(&state.db, limit)
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    Ok(Json(json!({"actions": rows.iter().map(row_json).collect::<Vec<_>>()})))
}

/// `GET /audit/by_case/{case_id}?limit=`.
pub async fn by_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let limit = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);
    let rows = actions::by_case(&state.db, &case_id, limit)
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;
    Ok(Json(json!({"actions": rows.iter().map(row_json).collect::<Vec<_>>()})))
}
