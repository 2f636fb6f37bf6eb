//! `idempotency_keys` storage: the global idempotency table backing the
//! public `/actions/execute` endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IdempotencyRow {
    pub key: String,
    pub request_hash: String,
    #[sqlx(rename = "response")]
    response_raw: String,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRow {
    pub fn response(&self) -> Value {
        serde_json::from_str(&self.response_raw).unwrap_or(Value::Null)
    }
}

pub async fn get(pool: &DbPool, key: &str) -> Result<Option<IdempotencyRow>, StorageError> {
    sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Insert a new key/response pair. A race where another writer inserts the
/// same key first is tolerated: the
/// conflicting insert is simply ignored, and the next replay observes the
/// winner.
pub async fn store(
    pool: &DbPool,
    key: &str,
    request_hash: &str,
    response: &Value,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO idempotency_keys (key, request_hash, response, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(key) DO NOTHING",
    )
    .bind(key)
    .bind(request_hash)
    .bind(response.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use serde_json::json;

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let pool = init_test_db().await.unwrap();
        store(&pool, "k1", "hash-a", &json!({"ok": true})).await.unwrap();
        let row = get(&pool, "k1").await.unwrap().unwrap();
        assert_eq!(row.request_hash, "hash-a");
        assert_eq!(row.response(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn conflicting_insert_keeps_first_writer() {
        let pool = init_test_db().await.unwrap();
        store(&pool, "k1", "hash-a", &json!({"v": 1})).await.unwrap();
        store(&pool, "k1", "hash-b", &json!({"v": 2})).await.unwrap();
        let row = get(&pool, "k1").await.unwrap().unwrap();
        assert_eq!(row.request_hash, "hash-a");
    }
}
