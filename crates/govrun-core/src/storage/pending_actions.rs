//! `pending_actions` storage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PendingAction {
    pub pending_id: String,
    pub case_id: String,
    pub card_id: Option<String>,
    pub materialization_id: Option<String>,
    pub status: String,
    pub approval_required: bool,
    pub action_type: String,
    #[sqlx(rename = "action_payload")]
    action_payload_raw: String,
    pub rationale: String,
    pub rank: i64,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_action_id: Option<String>,
    pub execution_result: Option<String>,
    pub decision_idempotency_key: Option<String>,
    pub decision_request_hash: Option<String>,
    pub execution_idempotency_key: Option<String>,
    pub execution_request_hash: Option<String>,
    pub superseded_by_materialization_id: Option<String>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub canceled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn action_payload(&self) -> Value {
        serde_json::from_str(&self.action_payload_raw).unwrap_or(Value::Object(serde_json::Map::new()))
    }
}

pub async fn get(pool: &DbPool, pending_id: &str) -> Result<Option<PendingAction>, StorageError> {
    sqlx::query_as("SELECT * FROM pending_actions WHERE pending_id = ?")
        .bind(pending_id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

#[derive(Debug, Default)]
pub struct ListFilter<'a> {
    pub case_id: Option<&'a str>,
    pub card_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub limit: i64,
}

pub async fn list(pool: &DbPool, filter: ListFilter<'_>) -> Result<Vec<PendingAction>, StorageError> {
    let mut sql = String::from("SELECT * FROM pending_actions WHERE 1=1");
    if filter.case_id.is_some() {
        sql.push_str(" AND case_id = ?");
    }
    if filter.card_id.is_some() {
        sql.push_str(" AND card_id = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY updated_at DESC, rank ASC LIMIT ?");

    let mut query = sqlx::query_as(&sql);
    if let Some(case_id) = filter.case_id {
        query = query.bind(case_id);
    }
    if let Some(card_id) = filter.card_id {
        query = query.bind(card_id);
    }
    if let Some(status) = filter.status {
        query = query.bind(status);
    }
    query
        .bind(filter.limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Fetch every pending action produced by one materialization, ordered by
/// `rank`. Used to replay a repeated
/// materialization request.
pub async fn list_by_materialization(
    pool: &DbPool,
    materialization_id: &str,
) -> Result<Vec<PendingAction>, StorageError> {
    sqlx::query_as("SELECT * FROM pending_actions WHERE materialization_id = ? ORDER BY rank ASC")
        .bind(materialization_id)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Insert a freshly materialized pending action. `approval_required` is computed by the caller before the
/// row is created.
#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &DbPool,
    case_id: &str,
    card_id: Option<&str>,
    materialization_id: Option<&str>,
    action_type: &str,
    action_payload: &Value,
    rationale: &str,
    rank: i64,
    approval_required: bool,
) -> Result<PendingAction, StorageError> {
    let pending_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO pending_actions
            (pending_id, case_id, card_id, materialization_id, status, approval_required,
             action_type, action_payload, rationale, rank, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&pending_id)
    .bind(case_id)
    .bind(card_id)
    .bind(materialization_id)
    .bind(approval_required)
    .bind(action_type)
    .bind(action_payload.to_string())
    .bind(rationale)
    .bind(rank)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    get(pool, &pending_id)
        .await?
        .ok_or_else(|| StorageError::Query {
            source: sqlx::Error::RowNotFound,
        })
}

/// Apply an approve/reject decision.
#[allow(clippy::too_many_arguments)]
pub async fn apply_decision(
    pool: &DbPool,
    pending_id: &str,
    new_status: &str,
    approved_by: Option<&str>,
    note: Option<&str>,
    decision_idempotency_key: Option<&str>,
    decision_request_hash: &str,
) -> Result<PendingAction, StorageError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE pending_actions
         SET status = ?,
             approved_by = COALESCE(?, approved_by),
             approved_at = CASE WHEN ? = 'approved' THEN ? ELSE approved_at END,
             decision_idempotency_key = COALESCE(?, decision_idempotency_key),
             decision_request_hash = ?,
             execution_result = CASE WHEN ? IS NOT NULL THEN ? ELSE execution_result END,
             updated_at = ?
         WHERE pending_id = ?",
    )
    .bind(new_status)
    .bind(approved_by)
    .bind(new_status)
    .bind(now)
    .bind(decision_idempotency_key)
    .bind(decision_request_hash)
    .bind(note)
    .bind(note)
    .bind(now)
    .bind(pending_id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    get(pool, pending_id)
        .await?
        .ok_or_else(|| StorageError::Query {
            source: sqlx::Error::RowNotFound,
        })
}

/// Apply an execution outcome.
#[allow(clippy::too_many_arguments)]
pub async fn apply_execution(
    pool: &DbPool,
    pending_id: &str,
    new_status: &str,
    executed_action_id: Option<&str>,
    execution_result: &str,
    execution_idempotency_key: Option<&str>,
    execution_request_hash: &str,
) -> Result<PendingAction, StorageError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE pending_actions
         SET status = ?,
             executed_action_id = COALESCE(?, executed_action_id),
             execution_result = ?,
             execution_idempotency_key = COALESCE(?, execution_idempotency_key),
             execution_request_hash = ?,
             updated_at = ?
         WHERE pending_id = ?",
    )
    .bind(new_status)
    .bind(executed_action_id)
    .bind(execution_result)
    .bind(execution_idempotency_key)
    .bind(execution_request_hash)
    .bind(now)
    .bind(pending_id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    get(pool, pending_id)
        .await?
        .ok_or_else(|| StorageError::Query {
            source: sqlx::Error::RowNotFound,
        })
}

/// Supersede every row for `card_id` whose status is in `statuses`. Returns
/// the superseded pending ids, for the single batched `SupersedePendingActions`
/// audit row.
pub async fn supersede_for_card(
    pool: &DbPool,
    card_id: &str,
    statuses: &[String],
    superseded_by_materialization_id: &str,
) -> Result<Vec<String>, StorageError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let select_sql = format!(
        "SELECT pending_id FROM pending_actions WHERE card_id = ? AND status IN ({placeholders})"
    );
    let mut select_query = sqlx::query_scalar(&select_sql).bind(card_id);
    for status in statuses {
        select_query = select_query.bind(status);
    }
    let ids: Vec<String> = select_query
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;

    if ids.is_empty() {
        return Ok(ids);
    }

    let now = Utc::now();
    let update_sql = format!(
        "UPDATE pending_actions
         SET status = 'canceled',
             superseded_by_materialization_id = ?,
             superseded_at = ?,
             canceled_reason = 'superseded',
             updated_at = ?
         WHERE card_id = ? AND status IN ({placeholders})"
    );
    let mut update_query = sqlx::query(&update_sql)
        .bind(superseded_by_materialization_id)
        .bind(now)
        .bind(now)
        .bind(card_id);
    for status in statuses {
        update_query = update_query.bind(status);
    }
    update_query
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;

    Ok(ids)
}
