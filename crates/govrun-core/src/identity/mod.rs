//! Actor normalization: turn trusted gateway headers,
//! optional bearer-token claims, and a channel into a stable actor tuple.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::types::PolicyDocument;
use crate::rbac::role_for_channel;

/// The normalized actor produced by [`normalize_actor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub channel: String,
    pub role: String,
    pub email: String,
    pub sub: String,
    pub groups: Vec<String>,
    pub entitlements: Vec<String>,
    pub name: String,
    pub identity_provider: String,
    /// Which layer resolved `role`: `headers`, `jwt`, `mapped`, or `channel`.
    pub source: String,
}

/// Case-insensitive header lookup. The HTTP layer is expected to have
/// already lowercased header names when building this map.
pub type Headers = HashMap<String, String>;

fn header(headers: &Headers, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| headers.get(&n.to_lowercase()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else { return Vec::new() };
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn first_claim(claims: &Value, keys: &[&str]) -> Option<String> {
    let obj = claims.as_object()?;
    for key in keys {
        if let Some(v) = obj.get(*key) {
            if let Some(s) = v.as_str() {
                if !s.trim().is_empty() {
                    return Some(s.trim().to_string());
                }
            }
        }
    }
    None
}

fn detect_provider(policy: &PolicyDocument, claims: &Value) -> String {
    let default_provider = policy
        .identity
        .default_provider
        .clone()
        .unwrap_or_else(|| "oidc".to_string());
    for hint_key in &policy.identity.provider_hint_claims {
        if let Some(v) = claims.as_object().and_then(|o| o.get(hint_key)).and_then(Value::as_str) {
            let s = v.to_lowercase();
            if s.contains("saml") {
                return "saml".to_string();
            }
            if s.contains("oidc") || s.contains("auth0") || s.contains("okta") || s.contains("azure") || s.contains("cognito") {
                return "oidc".to_string();
            }
        }
    }
    default_provider
}

/// Role derivation from `group_rules`/`entitlement_rules`, honoring
/// `first_match_wins`: when `false`, every matching rule and exact-map
/// source contributes a candidate and `role_priority` breaks the tie.
fn derive_role_from_mappings(policy: &PolicyDocument, values: &[String], claim_name: &str) -> Option<String> {
    let rm = &policy.rbac.role_mapping;

    if let Some(deny_rules) = rm.deny.get(claim_name) {
        for value in values {
            if deny_rules.iter().any(|item| item.matches(value)) {
                return Some("denied".to_string());
            }
        }
    }

    let rules: &[crate::policy::types::RoleRule] = if claim_name == "groups" {
        &rm.group_rules
    } else {
        &rm.entitlement_rules
    };

    if rm.first_match_wins {
        for rule in rules {
            if rule.when.matches_any(values) {
                return Some(rule.role.clone());
            }
        }
        return None;
    }

    let mut candidates: Vec<String> = Vec::new();
    for source in &rm.sources {
        if source.claim != claim_name {
            continue;
        }
        for value in values {
            if let Some(mapped) = source.map.get(value) {
                candidates.push(mapped.clone());
            }
        }
    }
    for rule in rules {
        if rule.when.matches_any(values) {
            candidates.push(rule.role.clone());
        }
    }

    if candidates.is_empty() {
        return None;
    }
    candidates
        .into_iter()
        .min_by_key(|role| rm.role_priority.iter().position(|p| p == role).unwrap_or(usize::MAX))
}

/// Normalize the actor for one request.
pub fn normalize_actor(
    policy: &PolicyDocument,
    headers: &Headers,
    jwt_claims: Option<&Value>,
    channel: &str,
) -> Actor {
    let empty_claims = Value::Object(serde_json::Map::new());
    let claims = jwt_claims.unwrap_or(&empty_claims);
    let provider = detect_provider(policy, claims);
    let claim_map = policy.identity.providers.get(&provider);

    let hdr_role = header(headers, &["x-user-role", "x-role"]);
    let hdr_email = header(headers, &["x-user-email", "x-email"]);
    let hdr_sub = header(headers, &["x-user-id", "x-subject", "x-user"]);
    let hdr_groups = header(headers, &["x-user-groups", "x-groups"]);
    let hdr_entitlements = header(headers, &["x-user-entitlements", "x-entitlements"]);
    let hdr_name = header(headers, &["x-user-name", "x-name"]);

    let mut sub = hdr_sub;
    let mut email = hdr_email;
    let mut role = hdr_role;
    let mut groups = split_csv(hdr_groups.as_deref());
    let mut entitlements = split_csv(hdr_entitlements.as_deref());
    let mut name = hdr_name;

    // `source` records which layer resolved `role` specifically, not which
    // layer contributed any claim — it is only set at the point `role`
    // itself is assigned, below.
    let mut source = if role.is_some() { "headers".to_string() } else { String::new() };

    if sub.is_none() || email.is_none() || role.is_none() {
        let sub_keys = claim_map.map(|m| m.sub.as_slice()).filter(|v| !v.is_empty());
        let email_keys = claim_map.map(|m| m.email.as_slice()).filter(|v| !v.is_empty());
        let name_keys = claim_map.map(|m| m.name.as_slice()).filter(|v| !v.is_empty());
        let groups_keys = claim_map.map(|m| m.groups.as_slice()).filter(|v| !v.is_empty());
        let ent_keys = claim_map.map(|m| m.entitlements.as_slice()).filter(|v| !v.is_empty());

        if sub.is_none() {
            let keys = sub_keys.unwrap_or(&["sub"]);
            let keys_ref: Vec<&str> = keys.iter().map(String::as_str).collect();
            sub = first_claim(claims, &keys_ref);
        }
        if email.is_none() {
            let keys = email_keys.unwrap_or(&["email"]);
            let keys_ref: Vec<&str> = keys.iter().map(String::as_str).collect();
            email = first_claim(claims, &keys_ref);
        }
        if name.is_none() {
            let keys = name_keys.unwrap_or(&["name"]);
            let keys_ref: Vec<&str> = keys.iter().map(String::as_str).collect();
            name = first_claim(claims, &keys_ref);
        }
        if groups.is_empty() {
            let keys = groups_keys.unwrap_or(&["groups"]);
            let keys_ref: Vec<&str> = keys.iter().map(String::as_str).collect();
            let v = first_claim(claims, &keys_ref);
            groups = split_csv(v.as_deref());
        }
        if entitlements.is_empty() {
            let keys = ent_keys.unwrap_or(&["entitlements"]);
            let keys_ref: Vec<&str> = keys.iter().map(String::as_str).collect();
            let v = first_claim(claims, &keys_ref);
            entitlements = split_csv(v.as_deref());
        }
    }

    if role.is_none() {
        let derived = derive_role_from_mappings(policy, &groups, "groups")
            .or_else(|| derive_role_from_mappings(policy, &entitlements, "entitlements"));
        if let Some(derived) = derived {
            role = Some(derived);
            source = "mapped".to_string();
        }
    }

    if role.is_none() {
        role = Some(role_for_channel(policy, channel));
        source = "channel".to_string();
    }

    Actor {
        channel: channel.to_string(),
        role: role.unwrap_or_else(|| "ui".to_string()),
        email: email.unwrap_or_default(),
        sub: sub.unwrap_or_default(),
        groups,
        entitlements,
        name: name.unwrap_or_default(),
        identity_provider: provider,
        source,
    }
}
