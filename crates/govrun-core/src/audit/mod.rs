//! Audit envelope builder: request sanitization and
//! the `_audit` envelope attached to every audited payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Actor;
use crate::policy::header_pattern::{compile_all, HeaderPattern};
use crate::policy::types::PolicyDocument;

/// Headers/denylist stripped unconditionally, before any policy pattern is
/// consulted.
const HARD_DENYLIST: [&str; 4] = ["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// The raw inbound request facts the envelope builder sanitizes.
pub struct RequestFacts<'a> {
    pub path: &'a str,
    pub method: &'a str,
    /// Header name (any case) → value. Only one value per name is kept,
    /// matching the gateway's trusted single-value header contract.
    pub headers: &'a HashMap<String, String>,
    pub query: &'a HashMap<String, String>,
}

/// Sanitized request facts embedded in the audit envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedRequest {
    pub path: String,
    pub method: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

/// The full `_audit` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEnvelope {
    pub actor: Value,
    pub request: SanitizedRequest,
    pub policy_revision: u64,
    pub materialization_id: String,
    pub request_id: String,
    pub correlation_id: String,
}

fn truncate(value: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    if value.chars().count() <= max_len {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_len.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

fn sanitize_request(policy: &PolicyDocument, facts: &RequestFacts<'_>) -> SanitizedRequest {
    let req_cfg = &policy.audit.request;
    let redact_compiled: Vec<HeaderPattern> = compile_all(&req_cfg.redact_headers);
    let allow_compiled: Vec<HeaderPattern> = compile_all(&req_cfg.allowlist_headers);

    let mut headers_out = HashMap::new();
    if !redact_compiled.is_empty() || !allow_compiled.is_empty() {
        for (name, value) in facts.headers {
            let name_lower = name.to_lowercase();
            if HARD_DENYLIST.contains(&name_lower.as_str()) {
                continue;
            }
            if redact_compiled.iter().any(|p| p.is_match(&name_lower)) {
                headers_out.insert(name_lower, "REDACTED".to_string());
                continue;
            }
            if allow_compiled.iter().any(|p| p.is_match(&name_lower)) {
                headers_out.insert(name_lower, truncate(value, req_cfg.header_value_max_len));
            }
        }
    }

    let mut query_out = HashMap::new();
    for key in &req_cfg.allowlist_query {
        if let Some(value) = facts.query.get(key) {
            query_out.insert(key.clone(), truncate(value, req_cfg.query_value_max_len));
        }
    }

    SanitizedRequest {
        path: facts.path.to_string(),
        method: facts.method.to_string(),
        query: query_out,
        headers: headers_out,
    }
}

/// Build the `_audit` envelope for one request.
pub fn build_envelope(
    policy: &PolicyDocument,
    actor: Option<&Actor>,
    facts: &RequestFacts<'_>,
    request_id: &str,
    materialization_id: Option<&str>,
) -> AuditEnvelope {
    AuditEnvelope {
        actor: actor
            .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
            .unwrap_or(Value::Object(serde_json::Map::new())),
        request: sanitize_request(policy, facts),
        policy_revision: policy.revision,
        materialization_id: materialization_id.unwrap_or_default().to_string(),
        request_id: request_id.to_string(),
        correlation_id: request_id.to_string(),
    }
}

/// Build an envelope for internal (non-HTTP) execution paths, such as the
/// execution pipeline's fallback when a payload arrives without one.
pub fn build_internal_envelope(
    policy: &PolicyDocument,
    actor_value: Value,
    request_path: &str,
    request_id: &str,
) -> AuditEnvelope {
    AuditEnvelope {
        actor: actor_value,
        request: SanitizedRequest {
            path: request_path.to_string(),
            method: String::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
        },
        policy_revision: policy.revision,
        materialization_id: String::new(),
        request_id: request_id.to_string(),
        correlation_id: request_id.to_string(),
    }
}

/// Return a copy of `payload` with `_audit` set to the envelope. Never
/// mutates the input.
pub fn with_audit(payload: &Value, envelope: &AuditEnvelope) -> Value {
    let mut out = match payload {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    out.insert(
        "_audit".to_string(),
        serde_json::to_value(envelope).unwrap_or(Value::Null),
    );
    Value::Object(out)
}
