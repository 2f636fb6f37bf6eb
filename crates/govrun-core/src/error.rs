//! Error types for the governed action runtime core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors from loading, parsing, or validating the policy document.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy file does not exist at the configured path.
    #[error("policy file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// The policy file could not be read from disk.
    #[error("failed to read policy file {path}: {source}")]
    Io {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The policy document failed to parse as YAML or JSON.
    #[error("failed to parse policy document: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// The policy document failed structural validation.
    #[error("policy validation failed: {0:?}")]
    Invalid(Vec<String>),

    /// The policy could not be serialized back to disk.
    #[error("failed to write policy file: {source}")]
    Write {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to the database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// A stored JSON column failed to deserialize.
    #[error("corrupt JSON in column {column}: {source}")]
    CorruptJson {
        /// The column name that failed to parse.
        column: String,
        /// The underlying serde_json error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced while normalizing a request's actor identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The bearer token could not be decoded or verified.
    #[error("invalid bearer token: {0}")]
    InvalidToken(String),

    /// No identity provider claim hints matched a configured provider.
    #[error("no identity provider matched token claims")]
    UnknownProvider,
}

/// The outcome of an RBAC or payload-rule check that denies an action.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RbacDenial(pub String);

/// Errors from the pending-action lifecycle state machine.
#[derive(Debug, thiserror::Error)]
pub enum PendingActionError {
    /// No pending action exists with the given id.
    #[error("pending action not found: {0}")]
    NotFound(String),

    /// The requested status transition is not permitted from the current status.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        /// The pending action's current status.
        from: String,
        /// The status the caller attempted to transition to.
        to: String,
    },

    /// The decision/execution idempotency key was reused with a different payload.
    #[error("Idempotency-Key reuse with different payload")]
    IdempotencyConflict,

    /// The caller lacks the permission required by RBAC or payload rules.
    #[error("{0}")]
    Forbidden(String),

    /// The action requires prior approval that has not been granted.
    #[error("approval required before execution")]
    ApprovalRequired,

    /// An underlying storage error occurred.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the execution pipeline's guardrail checks.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct GuardrailViolation(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_error_file_not_found_message() {
        let err = PolicyError::FileNotFound {
            path: "/etc/govrun/policy.yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "policy file not found: /etc/govrun/policy.yaml"
        );
    }

    #[test]
    fn pending_action_error_illegal_transition_message() {
        let err = PendingActionError::IllegalTransition {
            from: "executed".to_string(),
            to: "approved".to_string(),
        };
        assert_eq!(err.to_string(), "illegal transition from executed to approved");
    }

    #[test]
    fn identity_error_unknown_provider_message() {
        let err = IdentityError::UnknownProvider;
        assert_eq!(err.to_string(), "no identity provider matched token claims");
    }
}
