//! Process-level runtime configuration.
//!
//! Unlike the policy document (hot-reloaded, see [`crate::policy`]), this
//! configuration is read once at startup from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Process-wide runtime configuration, sourced entirely from environment
/// variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Connection string for the transactional store.
    pub db_url: String,
    /// Path to the hot-reloaded policy document.
    pub policy_path: PathBuf,
    /// Whether mutating governance endpoints (policy PATCH, maintenance) are enabled.
    pub dev_mode: bool,
    /// Shared secret for local JWT verification, if configured.
    pub jwt_secret: Option<String>,
    /// JWT signing algorithm, when `jwt_secret` is set.
    pub jwt_alg: String,
    /// Whether bearer tokens are verified locally (vs. trusted as opaque claims).
    pub jwt_verify: bool,
    /// Host to bind the HTTP listener to.
    pub api_host: String,
    /// Port to bind the HTTP listener to.
    pub api_port: u16,
    /// TTL for materialization rows before idempotency cleanup deletes them.
    pub idempotency_ttl: Duration,
    /// Interval between idempotency/materialization cleanup sweeps.
    pub idempotency_cleanup_interval: Duration,
    /// Connector used for non-`UpdateCardStatus` execution.
    pub connector_name: String,
}

impl RuntimeConfig {
    /// Load configuration from environment variables, applying documented
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let db_url = std::env::var("DB_URL").unwrap_or_else(|_| "sqlite://govrun.db".to_string());

        let policy_path = std::env::var("GOV_POLICY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("governance/policy.yaml"));

        let dev_mode = env_flag("DEV_MODE") || env_is("APP_ENV", "dev") || env_is("APP_ENV", "development");

        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());
        let jwt_alg = std::env::var("JWT_ALG").unwrap_or_else(|_| "HS256".to_string());
        let jwt_verify = env_flag("JWT_VERIFY");

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let idempotency_ttl_hours: u64 = std::env::var("IDEMPOTENCY_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let idempotency_cleanup_interval_secs: u64 = std::env::var("IDEMPOTENCY_CLEANUP_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let connector_name = std::env::var("GOV_CONNECTOR").unwrap_or_else(|_| "mock".to_string());

        Self {
            db_url,
            policy_path,
            dev_mode,
            jwt_secret,
            jwt_alg,
            jwt_verify,
            api_host,
            api_port,
            idempotency_ttl: Duration::from_secs(idempotency_ttl_hours * 3600),
            idempotency_cleanup_interval: Duration::from_secs(idempotency_cleanup_interval_secs),
            connector_name,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_is(name: &str, value: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case(value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_recognizes_truthy_values() {
        std::env::set_var("GOVRUN_TEST_FLAG", "true");
        assert!(env_flag("GOVRUN_TEST_FLAG"));
        std::env::set_var("GOVRUN_TEST_FLAG", "0");
        assert!(!env_flag("GOVRUN_TEST_FLAG"));
        std::env::remove_var("GOVRUN_TEST_FLAG");
    }

    #[test]
    fn defaults_apply_when_unset() {
        // Use a dedicated unset prefix to avoid clashing with any set vars.
        std::env::remove_var("API_PORT_MISSING_TEST");
        assert_eq!(
            std::env::var("API_PORT_MISSING_TEST")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            8080
        );
    }
}
