//! `agent_actions` storage: the append-only audit log. Never mutated once written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActionRow {
    pub action_id: String,
    pub case_id: String,
    pub channel: String,
    pub action_type: String,
    #[sqlx(rename = "payload")]
    payload_raw: String,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

impl ActionRow {
    pub fn payload(&self) -> Value {
        serde_json::from_str(&self.payload_raw).unwrap_or(Value::Null)
    }
}

/// Append one audit row. Best-effort callers should catch and log the
/// `Err` rather than propagate it.
pub async fn insert(
    pool: &DbPool,
    case_id: &str,
    channel: &str,
    action_type: &str,
    payload: &Value,
    result: &str,
) -> Result<String, StorageError> {
    let action_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO agent_actions (action_id, case_id, channel, action_type, payload, result, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&action_id)
    .bind(case_id)
    .bind(channel)
    .bind(action_type)
    .bind(payload.to_string())
    .bind(result)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(action_id)
}

pub async fn recent(pool: &DbPool, limit: i64) -> Result<Vec<ActionRow>, StorageError> {
    sqlx::query_as("SELECT * FROM agent_actions ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn by_case(pool: &DbPool, case_id: &str, limit: i64) -> Result<Vec<ActionRow>, StorageError> {
    sqlx::query_as("SELECT * FROM agent_actions WHERE case_id = ? ORDER BY created_at DESC LIMIT ?")
        .bind(case_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}
