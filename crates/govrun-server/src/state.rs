//! Shared application state for the governed action runtime server.

use govrun_core::config::RuntimeConfig;
use govrun_core::policy::PolicyStore;
use govrun_core::storage::DbPool;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// SQLite connection pool backing the transactional store.
    pub db: DbPool,
    /// Hot-reloading policy document cache. Cheap to clone;
    /// already `Arc`-backed internally.
    pub policy: PolicyStore,
    /// Resolved runtime configuration (env-derived).
    pub config: RuntimeConfig,
}
