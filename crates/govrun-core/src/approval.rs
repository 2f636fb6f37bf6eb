//! Approval requirement inference.

use serde_json::Value;

use crate::policy::types::PolicyDocument;

/// Decide whether an action requires prior approval before execution.
///
/// Order (first match wins):
/// 1. `action_types_no_approval` → false.
/// 2. `action_types_require_approval` → true.
/// 3. `UpdateCardStatus` resolving a card inherits `card_status_policy`'s
///    approval gate.
/// 4. `external_connectors_require_approval` and the execution target isn't
///    `local_db` → true.
/// 5. Otherwise false.
pub fn approval_required_for_action(
    policy: &PolicyDocument,
    action_type: &str,
    payload: &Value,
    execution_target: &str,
) -> bool {
    let ap = &policy.action_approval_policy;

    if ap.action_types_no_approval.iter().any(|a| a == action_type) {
        return false;
    }
    if ap.action_types_require_approval.iter().any(|a| a == action_type) {
        return true;
    }

    if action_type == "UpdateCardStatus" {
        let new_status = payload
            .as_object()
            .and_then(|o| o.get("new_status"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if new_status == "resolved" {
            return match &ap.approval_gate.resolve {
                // An empty gate object sets no signal, so it requires nothing.
                // An absent gate falls back to "resolve is always gated".
                Some(gate) => gate.require_channel.is_some() || gate.require_high_risk_case.unwrap_or(false),
                None => true,
            };
        }
        return false;
    }

    ap.external_connectors_require_approval && execution_target != "local_db"
}
