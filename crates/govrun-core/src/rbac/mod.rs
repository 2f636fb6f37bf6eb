//! RBAC permission matrix and payload-rule enforcement.

use serde_json::Value;

use crate::policy::types::{ActionPayloadRule, PolicyDocument};

/// The outcome of an RBAC or payload-rule check: `Ok(())` on allow, a
/// human-readable reason on deny.
pub type RbacResult = Result<(), String>;

/// `rbac.channels[channel] ?? channel ?? "ui"`.
pub fn role_for_channel(policy: &PolicyDocument, channel: &str) -> String {
    policy
        .rbac
        .channels
        .get(channel)
        .cloned()
        .unwrap_or_else(|| {
            if channel.is_empty() {
                "ui".to_string()
            } else {
                channel.to_string()
            }
        })
}

fn list_allows(allow: &[String], action_type: &str) -> bool {
    allow.iter().any(|a| a == "*" || a == action_type)
}

/// Dereference a dot-path (`a.b.c`) into a JSON object.
fn get_by_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = payload;
    for part in path.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

fn payload_rule_applies(rule: &ActionPayloadRule, action_type: &str, payload: Option<&Value>) -> bool {
    if rule.action_type != action_type {
        return false;
    }
    if rule.when.is_empty() {
        return true;
    }
    let Some(payload) = payload else {
        return false;
    };
    for (key, matcher) in &rule.when {
        let actual = if key.contains('.') {
            get_by_path(payload, key)
        } else {
            payload.as_object().and_then(|obj| obj.get(key))
        };
        if !matcher.matches(actual) {
            return false;
        }
    }
    true
}

fn enforce_action_payload_rules(
    policy: &PolicyDocument,
    action_type: &str,
    payload: Option<&Value>,
    role: &str,
    case_risk_score: Option<f64>,
) -> RbacResult {
    for rule in &policy.rbac.action_payload_rules {
        if !payload_rule_applies(rule, action_type, payload) {
            continue;
        }

        if let Some(require_roles) = &rule.require_roles {
            if !require_roles.iter().any(|r| r == role) {
                return Err(rule
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("role '{role}' not permitted by payload rule")));
            }
        }

        if let Some(deny_roles) = &rule.deny_roles {
            if deny_roles.iter().any(|r| r == role) {
                return Err(rule
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("role '{role}' denied by payload rule")));
            }
        }

        if let Some(threshold) = rule.require_risk_ge {
            let threshold = f64::from(threshold);
            let meets = case_risk_score.is_some_and(|rs| rs >= threshold);
            if !meets {
                return Err(rule.reason.clone().unwrap_or_else(|| {
                    format!(
                        "case risk_score {} below required threshold {threshold}",
                        case_risk_score
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "none".to_string())
                    )
                }));
            }
        }
    }
    Ok(())
}

/// `can_execute`: role permission check, legacy
/// `operator_update_cardstatus` constraint, then ordered payload rules.
pub fn can_execute(
    policy: &PolicyDocument,
    channel: &str,
    action_type: &str,
    payload: Option<&Value>,
    role: Option<&str>,
    case_risk_score: Option<f64>,
) -> RbacResult {
    let resolved_role = role.map(str::to_string).unwrap_or_else(|| role_for_channel(policy, channel));

    let allow = policy
        .rbac
        .permissions
        .execute
        .get(&resolved_role)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    if !list_allows(allow, action_type) {
        return Err(format!(
            "role '{resolved_role}' not permitted to execute action_type '{action_type}'"
        ));
    }

    if resolved_role == "operator" && action_type == "UpdateCardStatus" {
        let deny = &policy
            .rbac
            .constraints
            .operator_update_cardstatus
            .deny_new_status;
        let new_status = payload
            .and_then(|p| p.as_object())
            .and_then(|o| o.get("new_status"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if !new_status.is_empty() && deny.iter().any(|s| s == new_status) {
            return Err(format!("operator cannot set card status to '{new_status}'"));
        }
    }

    enforce_action_payload_rules(policy, action_type, payload, &resolved_role, case_risk_score)
        .map_err(|reason| format!("payload rule: {reason}"))
}

/// `can_approve`: identical shape to `can_execute` but
/// consults `permissions.approve`.
pub fn can_approve(
    policy: &PolicyDocument,
    channel: &str,
    action_type: &str,
    role: Option<&str>,
    payload: Option<&Value>,
    case_risk_score: Option<f64>,
) -> RbacResult {
    let resolved_role = role.map(str::to_string).unwrap_or_else(|| role_for_channel(policy, channel));

    let allow = policy
        .rbac
        .permissions
        .approve
        .get(&resolved_role)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    if !list_allows(allow, action_type) {
        return Err(format!(
            "role '{resolved_role}' not permitted to approve action_type '{action_type}'"
        ));
    }

    enforce_action_payload_rules(policy, action_type, payload, &resolved_role, case_risk_score)
        .map_err(|reason| format!("payload rule: {reason}"))
}
