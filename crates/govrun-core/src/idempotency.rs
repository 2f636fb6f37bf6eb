//! Idempotency store: the global `/actions/execute`
//! key/response table, plus the scoped key derivation used by the
//! pending-action endpoints.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::policy::canonical::canonical_hash;
use crate::storage::{idempotency_keys, DbPool};

/// Outcome of a `check_or_replay` lookup.
pub enum ReplayOutcome {
    /// No prior row: callers should proceed with the request.
    Fresh,
    /// A prior row with a matching hash: callers should return this
    /// response as-is, without re-executing.
    Replay(Value),
    /// A prior row exists but the request payload differs.
    Conflict,
}

/// `check_or_replay(key, req_hash)` against the global idempotency table.
pub async fn check_or_replay(pool: &DbPool, key: &str, req_hash: &str) -> Result<ReplayOutcome, StorageError> {
    let Some(row) = idempotency_keys::get(pool, key).await? else {
        return Ok(ReplayOutcome::Fresh);
    };
    if row.request_hash != req_hash {
        return Ok(ReplayOutcome::Conflict);
    }
    Ok(ReplayOutcome::Replay(row.response()))
}

/// Store a fresh `(key, request_hash, response)` row. Races on the unique
/// key are tolerated: the conflicting insert is a no-op, and the next
/// replay observes whichever writer won.
pub async fn store(pool: &DbPool, key: &str, req_hash: &str, response: &Value) -> Result<(), StorageError> {
    idempotency_keys::store(pool, key, req_hash, response).await
}

/// `request_hash = SHA-256(canonical_json(value))`.
pub fn request_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    canonical_hash(value)
}

/// Scoped idempotency key for the pending-action endpoints: `SHA-256(endpoint
/// | subject | card_id | raw_key)`.
/// `card_id` is the empty string for pending actions with no card.
pub fn scoped_key(endpoint: &str, subject: &str, card_id: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(b"|");
    hasher.update(subject.as_bytes());
    hasher.update(b"|");
    hasher.update(card_id.as_bytes());
    hasher.update(b"|");
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use serde_json::json;

    #[tokio::test]
    async fn check_or_replay_is_fresh_when_no_row_exists() {
        let pool = init_test_db().await.unwrap();
        let outcome = check_or_replay(&pool, "k1", "h1").await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Fresh));
    }

    #[tokio::test]
    async fn check_or_replay_replays_matching_hash() {
        let pool = init_test_db().await.unwrap();
        store(&pool, "k1", "h1", &json!({"ok": true})).await.unwrap();
        let outcome = check_or_replay(&pool, "k1", "h1").await.unwrap();
        match outcome {
            ReplayOutcome::Replay(v) => assert_eq!(v, json!({"ok": true})),
            _ => panic!("expected replay"),
        }
    }

    #[tokio::test]
    async fn check_or_replay_detects_conflict() {
        let pool = init_test_db().await.unwrap();
        store(&pool, "k1", "h1", &json!({"ok": true})).await.unwrap();
        let outcome = check_or_replay(&pool, "k1", "h2").await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Conflict));
    }

    #[test]
    fn scoped_key_is_stable_and_scope_sensitive() {
        let a = scoped_key("/pending_actions/1/decision", "user-1", "card-1", "raw-key");
        let b = scoped_key("/pending_actions/1/decision", "user-1", "card-1", "raw-key");
        let c = scoped_key("/pending_actions/1/decision", "user-2", "card-1", "raw-key");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn scoped_key_allows_empty_card_id() {
        let key = scoped_key("/actions/execute", "user-1", "", "raw-key");
        assert_eq!(key.len(), 64);
    }
}
