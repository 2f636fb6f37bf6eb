//! Policy document schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::matcher::Matcher;
use super::role_match::{RoleWhen, RoleWhenItem};

/// The process-wide policy document, loaded and hot-reloaded by [`super::PolicyStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Strictly increases on each successful `PATCH /governance/policy`.
    #[serde(default)]
    pub revision: u64,
    /// UTC timestamp of the last successful mutation.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub card_status_policy: CardStatusPolicy,
    #[serde(default)]
    pub rbac: RbacPolicy,
    #[serde(default)]
    pub identity: IdentityPolicy,
    #[serde(default)]
    pub audit: AuditPolicy,
    #[serde(default)]
    pub idempotency: IdempotencyPolicy,
    #[serde(default)]
    pub action_approval_policy: ActionApprovalPolicy,
    #[serde(default)]
    pub pending_action_policy: PendingActionPolicy,
    #[serde(default)]
    pub materialization_policy: MaterializationPolicy,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            revision: 0,
            updated_at: Utc::now(),
            card_status_policy: CardStatusPolicy::default(),
            rbac: RbacPolicy::default(),
            identity: IdentityPolicy::default(),
            audit: AuditPolicy::default(),
            idempotency: IdempotencyPolicy::default(),
            action_approval_policy: ActionApprovalPolicy::default(),
            pending_action_policy: PendingActionPolicy::default(),
            materialization_policy: MaterializationPolicy::default(),
        }
    }
}

/// `card_status_policy.allowed_transitions` (status → list of status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardStatusPolicy {
    #[serde(default = "default_card_transitions")]
    pub allowed_transitions: HashMap<String, Vec<String>>,
    /// Whether `blocked_reason` is required when transitioning into `blocked`.
    #[serde(default = "default_true")]
    pub require_blocked_reason: bool,
}

impl Default for CardStatusPolicy {
    fn default() -> Self {
        Self {
            allowed_transitions: default_card_transitions(),
            require_blocked_reason: true,
        }
    }
}

fn default_card_transitions() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert(
        "todo".to_string(),
        vec!["in_progress".to_string(), "blocked".to_string()],
    );
    m.insert(
        "in_progress".to_string(),
        vec![
            "blocked".to_string(),
            "resolved".to_string(),
            "todo".to_string(),
        ],
    );
    m.insert(
        "blocked".to_string(),
        vec!["in_progress".to_string(), "todo".to_string()],
    );
    m.insert("resolved".to_string(), vec![]);
    m
}

fn default_true() -> bool {
    true
}

/// `rbac` subtree: channel-to-role mapping, permission matrix, payload rules,
/// and the role-mapping configuration used by the identity normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RbacPolicy {
    #[serde(default)]
    pub channels: HashMap<String, String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub action_payload_rules: Vec<ActionPayloadRule>,
    #[serde(default)]
    pub role_mapping: RoleMapping,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    /// role → list of action-type (or `"*"`).
    #[serde(default)]
    pub execute: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub approve: HashMap<String, Vec<String>>,
}

/// Legacy constraint carried from the original system: operators may never
/// set a card to a status in `deny_new_status` via `UpdateCardStatus`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub operator_update_cardstatus: OperatorUpdateCardStatusConstraint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorUpdateCardStatusConstraint {
    #[serde(default)]
    pub deny_new_status: Vec<String>,
}

/// One entry of `rbac.action_payload_rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayloadRule {
    pub action_type: String,
    #[serde(default)]
    pub when: HashMap<String, Matcher>,
    #[serde(default)]
    pub require_roles: Option<Vec<String>>,
    #[serde(default)]
    pub deny_roles: Option<Vec<String>>,
    #[serde(default)]
    pub require_risk_ge: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `rbac.role_mapping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Legacy exact claim-value → role mappings, keyed by claim name.
    #[serde(default)]
    pub sources: Vec<RoleSource>,
    #[serde(default)]
    pub group_rules: Vec<RoleRule>,
    #[serde(default)]
    pub entitlement_rules: Vec<RoleRule>,
    /// claim name (`groups`/`entitlements`) → deny-matching `when` clauses.
    #[serde(default)]
    pub deny: HashMap<String, Vec<RoleWhenItem>>,
    #[serde(default = "default_true")]
    pub first_match_wins: bool,
    #[serde(default = "default_role_priority")]
    pub role_priority: Vec<String>,
}

impl Default for RoleMapping {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            group_rules: Vec::new(),
            entitlement_rules: Vec::new(),
            deny: HashMap::new(),
            first_match_wins: true,
            role_priority: default_role_priority(),
        }
    }
}

fn default_role_priority() -> Vec<String> {
    vec![
        "system".to_string(),
        "supervisor".to_string(),
        "operator".to_string(),
        "ui".to_string(),
    ]
}

/// One entry of `role_mapping.sources`: an exact claim-value → role map,
/// scoped to a single claim name (`groups` or `entitlements`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSource {
    pub claim: String,
    #[serde(default)]
    pub map: HashMap<String, String>,
}

/// One entry of `group_rules` / `entitlement_rules`: `{role, when}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: String,
    pub when: RoleWhen,
}

/// `identity` subtree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityPolicy {
    #[serde(default)]
    pub providers: HashMap<String, IdentityProvider>,
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Claim names scanned to heuristically detect the token issuer
    ///: a SAML/OIDC-ish string value under any of these
    /// claim names selects the provider.
    #[serde(default)]
    pub provider_hint_claims: Vec<String>,
}

/// `identity.providers.<name>`: claim-name lists per normalized field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityProvider {
    #[serde(default)]
    pub sub: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub entitlements: Vec<String>,
}

/// `audit.request` sanitization policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPolicy {
    #[serde(default)]
    pub request: AuditRequestPolicy,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            request: AuditRequestPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequestPolicy {
    #[serde(default)]
    pub allowlist_headers: Vec<super::header_pattern::PatternSpec>,
    #[serde(default)]
    pub redact_headers: Vec<super::header_pattern::PatternSpec>,
    #[serde(default)]
    pub allowlist_query: Vec<String>,
    #[serde(default = "default_header_value_max_len")]
    pub header_value_max_len: usize,
    #[serde(default = "default_query_value_max_len")]
    pub query_value_max_len: usize,
}

impl Default for AuditRequestPolicy {
    fn default() -> Self {
        Self {
            allowlist_headers: Vec::new(),
            redact_headers: Vec::new(),
            allowlist_query: Vec::new(),
            header_value_max_len: default_header_value_max_len(),
            query_value_max_len: default_query_value_max_len(),
        }
    }
}

fn default_header_value_max_len() -> usize {
    256
}

fn default_query_value_max_len() -> usize {
    256
}

/// `idempotency` policy switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_materialization_ttl_hours")]
    pub materialization_ttl_hours: u32,
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            materialization_ttl_hours: default_materialization_ttl_hours(),
        }
    }
}

fn default_materialization_ttl_hours() -> u32 {
    24
}

/// `action_approval_policy`: inputs to approval inference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionApprovalPolicy {
    #[serde(default)]
    pub action_types_no_approval: Vec<String>,
    #[serde(default)]
    pub action_types_require_approval: Vec<String>,
    #[serde(default = "default_true")]
    pub external_connectors_require_approval: bool,
    #[serde(default)]
    pub approval_gate: ApprovalGatePolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalGatePolicy {
    #[serde(default)]
    pub resolve: Option<ResolveGate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveGate {
    #[serde(default)]
    pub require_channel: Option<String>,
    #[serde(default)]
    pub require_high_risk_case: Option<bool>,
    #[serde(default)]
    pub high_risk_threshold: Option<i32>,
}

/// `pending_action_policy`: lifecycle transition table and supersede scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingActionPolicy {
    #[serde(default = "default_pending_transitions")]
    pub allowed_transitions: HashMap<String, Vec<String>>,
    #[serde(default = "default_supersede_statuses")]
    pub supersede_statuses: Vec<String>,
}

impl Default for PendingActionPolicy {
    fn default() -> Self {
        Self {
            allowed_transitions: default_pending_transitions(),
            supersede_statuses: default_supersede_statuses(),
        }
    }
}

fn default_pending_transitions() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert(
        "pending".to_string(),
        vec![
            "approved".to_string(),
            "rejected".to_string(),
            "canceled".to_string(),
            "blocked".to_string(),
        ],
    );
    m.insert(
        "approved".to_string(),
        vec![
            "executed".to_string(),
            "blocked".to_string(),
            "canceled".to_string(),
        ],
    );
    m.insert("rejected".to_string(), vec![]);
    m.insert("executed".to_string(), vec![]);
    m.insert("blocked".to_string(), vec![]);
    m.insert("canceled".to_string(), vec![]);
    m
}

fn default_supersede_statuses() -> Vec<String> {
    vec!["pending".to_string(), "approved".to_string()]
}

/// `materialization_policy`: unique-scope and default generator behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationPolicy {
    #[serde(default = "default_true")]
    pub supersede_on_rematerialize: bool,
}

impl Default for MaterializationPolicy {
    fn default() -> Self {
        Self {
            supersede_on_rematerialize: true,
        }
    }
}
