//! `agent_cases` storage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use super::DbPool;
use crate::error::StorageError;

/// A case row, read back from storage.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Case {
    pub case_id: String,
    pub resource_id: String,
    pub risk_score: i64,
    pub confidence: f64,
    pub status: String,
    /// Stored as a JSON array; surfaced to callers as a parsed [`Value`].
    #[sqlx(rename = "root_signals")]
    root_signals_raw: String,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn root_signals(&self) -> Value {
        serde_json::from_str(&self.root_signals_raw).unwrap_or(Value::Array(vec![]))
    }
}

/// Look up a single case by id.
pub async fn get(pool: &DbPool, case_id: &str) -> Result<Option<Case>, StorageError> {
    sqlx::query_as("SELECT * FROM agent_cases WHERE case_id = ?")
        .bind(case_id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// List cases, optionally filtered by status, newest-updated first.
pub async fn list(pool: &DbPool, status: Option<&str>, limit: i64) -> Result<Vec<Case>, StorageError> {
    let rows = if let Some(status) = status {
        sqlx::query_as("SELECT * FROM agent_cases WHERE status = ? ORDER BY updated_at DESC LIMIT ?")
            .bind(status)
            .bind(limit)
            .fetch_all(pool)
            .await
    } else {
        sqlx::query_as("SELECT * FROM agent_cases ORDER BY updated_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await
    };
    rows.map_err(|source| StorageError::Query { source })
}

/// Insert or replace a case row. Used by tests and demo seeding; the real
/// ingestion pipeline that produces cases is out of scope.
pub async fn upsert(
    pool: &DbPool,
    case_id: &str,
    resource_id: &str,
    risk_score: i64,
    confidence: f64,
    status: &str,
    root_signals: &Value,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO agent_cases (case_id, resource_id, risk_score, confidence, status, root_signals, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(case_id) DO UPDATE SET
            resource_id = excluded.resource_id,
            risk_score = excluded.risk_score,
            confidence = excluded.confidence,
            status = excluded.status,
            root_signals = excluded.root_signals,
            updated_at = excluded.updated_at",
    )
    .bind(case_id)
    .bind(resource_id)
    .bind(risk_score)
    .bind(confidence)
    .bind(status)
    .bind(root_signals.to_string())
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
    async fn upsert_then_get_round_trips() {
        let pool = init_test_db().await.unwrap();
        upsert(&pool, "c1", "res-1", 85, 0.7, "open", &json!(["sig-a"]))
            .await
            .unwrap();
        let case = get(&pool, "c1").await.unwrap().unwrap();
        assert_eq!(case.risk_score, 85);
        assert_eq!(case.root_signals(), json!(["sig-a"]));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let pool = init_test_db().await.unwrap();
        upsert(&pool, "c1", "r1", 10, 0.1, "open", &json!([])).await.unwrap();
        upsert(&pool, "c2", "r2", 20, 0.2, "closed", &json!([])).await.unwrap();
        let open = list(&pool, Some("open"), 100).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].case_id, "c1");
    }
}
