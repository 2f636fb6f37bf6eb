//! Governance endpoints: hot-reloaded policy document read/validate/patch.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use govrun_core::policy::{merge_patch, validate, PolicyDocument, PolicyStore};

use crate::error::ApiError;
use crate::request_context::resolve_request_id;
use crate::state::AppState;

fn policy_response(doc: &PolicyDocument, path: &str) -> Response {
    let etag = PolicyStore::etag(doc);
    let body = Json(json!({
        "policy": doc,
        "meta": {"etag": etag, "revision": doc.revision},
        "path": path,
    }));
    let mut response = body.into_response();
    if let Ok(value) = etag.parse() {
        response.headers_mut().insert(axum::http::header::ETAG, value);
    }
    if let Ok(value) = doc.revision.to_string().parse() {
        response.headers_mut().insert("x-policy-revision", value);
    }
    response
}

/// `GET /governance/policy`.
pub async fn get_policy(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, ApiError> {
    let request_id = resolve_request_id(&headers);
    let doc = state.policy.load().map_err(|e| ApiError::from_policy(e, request_id))?;
    Ok(policy_response(&doc, &state.policy.path().display().to_string()))
}

/// `POST /governance/policy/validate`: applies `body` as a merge
/// patch over the currently loaded document and structurally validates the
/// result, without persisting anything.
pub async fn validate_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request_id = resolve_request_id(&headers);
    let current = state.policy.load().map_err(|e| ApiError::from_policy(e, &request_id))?;
    let current_json = serde_json::to_value(&*current).unwrap_or(Value::Null);
    let merged = merge_patch(&current_json, &patch);

    let candidate: PolicyDocument = match serde_json::from_value(merged) {
        Ok(doc) => doc,
        Err(err) => {
            return Ok(Json(json!({"ok": false, "errors": [err.to_string()], "warnings": []})));
        }
    };

    let report = validate(&candidate);
    Ok(Json(json!({"ok": report.ok(), "errors": report.errors, "warnings": report.warnings})))
}

/// `PATCH /governance/policy`: dev-mode-only,
/// requires `If-Match` against the current etag, applies an RFC 7396 JSON
/// merge patch, bumps `revision`, and persists.
pub async fn patch_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Result<Response, ApiError> {
    let request_id = resolve_request_id(&headers);

    if !state.config.dev_mode {
        return Err(ApiError::dev_mode_required(request_id));
    }

    let current = state.policy.load().map_err(|e| ApiError::from_policy(e, &request_id))?;
    let current_etag = PolicyStore::etag(&current);

    let if_match = headers
        .get(axum::http::header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_matches('"'));
    let Some(if_match) = if_match else {
        return Err(ApiError::precondition_required("If-Match header is required", request_id));
    };
    if if_match != current_etag {
        return Err(ApiError::precondition_failed(
            "If-Match does not match the current policy etag",
            request_id,
        ));
    }

    let current_json = serde_json::to_value(&*current).unwrap_or(Value::Null);
    let merged = merge_patch(&current_json, &patch);
    let mut candidate: PolicyDocument = serde_json::from_value(merged)
        .map_err(|err| ApiError::validation(format!("invalid policy document: {err}"), &request_id))?;
    candidate.revision = current.revision + 1;
    candidate.updated_at = chrono::Utc::now();

    let report = validate(&candidate);
    if !report.ok() {
        return Err(ApiError::validation("policy document failed validation", request_id)
            .with_details(json!({"errors": report.errors})));
    }

    state
        .policy
        .save(&candidate)
        .map_err(|e| ApiError::from_policy(e, &request_id))?;

    Ok(policy_response(&candidate, &state.policy.path().display().to_string()))
}
