//! Structural validation of a [`PolicyDocument`].

use super::types::PolicyDocument;

/// The outcome of validating a policy document: hard errors block `save`,
/// warnings are surfaced but non-fatal.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

const CARD_STATUSES: [&str; 4] = ["todo", "in_progress", "blocked", "resolved"];
const PENDING_STATUSES: [&str; 6] = [
    "pending", "approved", "rejected", "executed", "blocked", "canceled",
];

/// Validate every subtree of the policy document, returning errors and
/// warnings without raising.
pub fn validate(doc: &PolicyDocument) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_card_status_policy(doc, &mut report);
    validate_rbac(doc, &mut report);
    validate_pending_action_policy(doc, &mut report);
    validate_audit(doc, &mut report);

    report
}

fn validate_card_status_policy(doc: &PolicyDocument, report: &mut ValidationReport) {
    for (from, tos) in &doc.card_status_policy.allowed_transitions {
        if !CARD_STATUSES.contains(&from.as_str()) {
            report.warnings.push(format!(
                "card_status_policy.allowed_transitions: unknown source status {from:?}"
            ));
        }
        for to in tos {
            if !CARD_STATUSES.contains(&to.as_str()) {
                report.errors.push(format!(
                    "card_status_policy.allowed_transitions[{from}]: unknown target status {to:?}"
                ));
            }
        }
    }
}

fn validate_rbac(doc: &PolicyDocument, report: &mut ValidationReport) {
    for rule in &doc.rbac.action_payload_rules {
        if rule.action_type.trim().is_empty() {
            report
                .errors
                .push("rbac.action_payload_rules: entry missing action_type".to_string());
        }
        for (field, matcher) in &rule.when {
            if let Err(e) = matcher.validate() {
                report.errors.push(format!(
                    "rbac.action_payload_rules[{}].when[{field}]: {e}",
                    rule.action_type
                ));
            }
        }
    }

    for rule in &doc.rbac.role_mapping.group_rules {
        if let Err(e) = rule.when.validate() {
            report
                .errors
                .push(format!("rbac.role_mapping.group_rules[{}]: {e}", rule.role));
        }
    }
    for rule in &doc.rbac.role_mapping.entitlement_rules {
        if let Err(e) = rule.when.validate() {
            report.errors.push(format!(
                "rbac.role_mapping.entitlement_rules[{}]: {e}",
                rule.role
            ));
        }
    }
    for (claim, items) in &doc.rbac.role_mapping.deny {
        for item in items {
            if let Err(e) = item.validate() {
                report
                    .errors
                    .push(format!("rbac.role_mapping.deny[{claim}]: {e}"));
            }
        }
    }
}

fn validate_pending_action_policy(doc: &PolicyDocument, report: &mut ValidationReport) {
    for (from, tos) in &doc.pending_action_policy.allowed_transitions {
        if !PENDING_STATUSES.contains(&from.as_str()) {
            report.warnings.push(format!(
                "pending_action_policy.allowed_transitions: unknown source status {from:?}"
            ));
        }
        for to in tos {
            if !PENDING_STATUSES.contains(&to.as_str()) {
                report.errors.push(format!(
                    "pending_action_policy.allowed_transitions[{from}]: unknown target status {to:?}"
                ));
            }
        }
    }
    for status in &doc.pending_action_policy.supersede_statuses {
        if !PENDING_STATUSES.contains(&status.as_str()) {
            report.errors.push(format!(
                "pending_action_policy.supersede_statuses: unknown status {status:?}"
            ));
        }
    }
}

fn validate_audit(doc: &PolicyDocument, report: &mut ValidationReport) {
    for pattern in doc
        .audit
        .request
        .redact_headers
        .iter()
        .chain(doc.audit.request.allowlist_headers.iter())
    {
        if let Err(e) = pattern.validate() {
            report
                .errors
                .push(format!("audit.request: invalid pattern {pattern:?}: {e}"));
        }
    }
    if doc.audit.request.header_value_max_len == 0 {
        report
            .warnings
            .push("audit.request.header_value_max_len is zero; all values truncate to empty".to_string());
    }
}
