//! Per-request admission context: request-id resolution,
//! channel/actor normalization, and the sanitized facts handlers pass into
//! the audit envelope builder.

use std::collections::HashMap;

use axum::http::HeaderMap;
use uuid::Uuid;

use govrun_core::audit::{build_envelope, AuditEnvelope, RequestFacts};
use govrun_core::identity::{normalize_actor, Actor, Headers};
use govrun_core::policy::types::PolicyDocument;

use crate::jwt::extract_claims;
use crate::state::AppState;

/// Prefer an inbound `X-Request-Id`, else mint a fresh one. The admission
/// middleware already guarantees the header is present by the time
/// handlers run; this fallback only matters for direct unit tests.
pub fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// `X-Channel`, defaulting to `api`.
pub fn resolve_channel(headers: &HeaderMap) -> String {
    headers
        .get("x-channel")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("api")
        .to_string()
}

/// Lowercase every header name, keeping one value per name (the gateway's
/// trusted single-value contract).
pub fn lowercase_headers(headers: &HeaderMap) -> Headers {
    let mut out = HashMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.insert(name.as_str().to_lowercase(), v.to_string());
        }
    }
    out
}

/// Resolve the normalized actor for this request: JWT claims
/// decoded from any bearer token, then trusted headers, then role mapping,
/// then channel fallback.
pub fn actor_for_request(state: &AppState, policy: &PolicyDocument, headers: &HeaderMap, channel: &str) -> Actor {
    let header_map = lowercase_headers(headers);
    let claims = extract_claims(&state.config, headers);
    normalize_actor(policy, &header_map, claims.as_ref(), channel)
}

/// Build the `_audit` envelope for this request.
#[allow(clippy::too_many_arguments)]
pub fn envelope_for_request(
    policy: &PolicyDocument,
    actor: &Actor,
    headers: &HeaderMap,
    method: &str,
    path: &str,
    query: &HashMap<String, String>,
    request_id: &str,
    materialization_id: Option<&str>,
) -> AuditEnvelope {
    let header_map = lowercase_headers(headers);
    let facts = RequestFacts {
        path,
        method,
        headers: &header_map,
        query,
    };
    build_envelope(policy, Some(actor), &facts, request_id, materialization_id)
}
