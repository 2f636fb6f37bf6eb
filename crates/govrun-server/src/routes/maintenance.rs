//! Dev-mode maintenance endpoints: on-demand idempotency/materialization
//! cleanup and a policy-derived status probe. Mirrors the original
//! `agent_runtime/app/api/routers/maintenance.py` router, which the same
//! `DEV_MODE`/`APP_ENV` gate in spec §6 names as "maintenance routes".

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use govrun_core::storage::materializations;

use crate::error::ApiError;
use crate::request_context::resolve_request_id;
use crate::state::AppState;

/// `POST /maintenance/cleanup?ttl_hours=` — dev-mode-only. Deletes
/// materializations older than `ttl_hours` (or the policy's configured
/// `idempotency.materialization_ttl_hours` when omitted), independent of
/// the background TTL sweep's own schedule.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);

    if !state.config.dev_mode {
        return Err(ApiError::dev_mode_required(request_id));
    }

    let policy = state.policy.load().map_err(|e| ApiError::from_policy(e, &request_id))?;
    let ttl_hours = query
        .get("ttl_hours")
        .and_then(|v| v.parse().ok())
        .unwrap_or(policy.idempotency.materialization_ttl_hours);

    let deleted = materializations::delete_older_than(&state.db, ttl_hours)
        .await
        .map_err(|e| ApiError::from_storage(e, request_id))?;

    Ok(Json(json!({
        "ok": true,
        "ttl_hours": ttl_hours,
        "deleted_materializations": deleted,
        "deleted_count": deleted.len(),
    })))
}

/// `GET /maintenance/status` — dev-mode-only. Reports the effective
/// idempotency policy switches, for operators to confirm what a cleanup run
/// would use.
pub async fn status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);

    if !state.config.dev_mode {
        return Err(ApiError::dev_mode_required(request_id));
    }

    let policy = state.policy.load().map_err(|e| ApiError::from_policy(e, request_id))?;
    Ok(Json(json!({
        "ok": true,
        "idempotency_policy": {
            "enabled": policy.idempotency.enabled,
            "materialization_ttl_hours": policy.idempotency.materialization_ttl_hours,
        },
    })))
}
