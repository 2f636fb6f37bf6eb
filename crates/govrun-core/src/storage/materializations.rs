//! `materializations` storage: scoped
//! `(endpoint, subject, card_id, idempotency_key)` rows, TTL-cleaned by the
//! idempotency housekeeping job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Materialization {
    pub materialization_id: String,
    pub endpoint: String,
    pub subject: String,
    pub card_id: String,
    pub case_id: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub objective: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Look up an existing materialization by its unique scope, for replay.
pub async fn find_by_scope(
    pool: &DbPool,
    endpoint: &str,
    subject: &str,
    card_id: &str,
    idempotency_key: &str,
) -> Result<Option<Materialization>, StorageError> {
    sqlx::query_as(
        "SELECT * FROM materializations
         WHERE endpoint = ? AND subject = ? AND card_id = ? AND idempotency_key = ?",
    )
    .bind(endpoint)
    .bind(subject)
    .bind(card_id)
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &DbPool,
    endpoint: &str,
    subject: &str,
    card_id: &str,
    case_id: &str,
    idempotency_key: &str,
    request_hash: &str,
    objective: &str,
    source: &str,
    ttl_hours: u32,
) -> Result<Materialization, StorageError> {
    let materialization_id = Uuid::new_v4().to_string();
    let created_at = Utc::now();
    let expires_at = created_at + chrono::Duration::hours(i64::from(ttl_hours));

    sqlx::query(
        "INSERT INTO materializations
            (materialization_id, endpoint, subject, card_id, case_id, idempotency_key, request_hash, objective, source, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&materialization_id)
    .bind(endpoint)
    .bind(subject)
    .bind(card_id)
    .bind(case_id)
    .bind(idempotency_key)
    .bind(request_hash)
    .bind(objective)
    .bind(source)
    .bind(created_at)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    Ok(Materialization {
        materialization_id,
        endpoint: endpoint.to_string(),
        subject: subject.to_string(),
        card_id: card_id.to_string(),
        case_id: case_id.to_string(),
        idempotency_key: idempotency_key.to_string(),
        request_hash: request_hash.to_string(),
        objective: objective.to_string(),
        source: source.to_string(),
        created_at,
        expires_at,
    })
}

/// Delete materializations past their TTL.
/// Returns the number of rows removed.
pub async fn delete_expired(pool: &DbPool) -> Result<u64, StorageError> {
    let result = sqlx::query("DELETE FROM materializations WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected())
}

/// Delete materializations created more than `ttl_hours` ago, ignoring each
/// row's own `expires_at`. Used by the dev-mode maintenance endpoint, which
/// lets an operator trigger a one-off sweep with an overridden TTL. Returns
/// the deleted `materialization_id`s.
pub async fn delete_older_than(pool: &DbPool, ttl_hours: u32) -> Result<Vec<String>, StorageError> {
    let cutoff = Utc::now() - chrono::Duration::hours(i64::from(ttl_hours));
    let rows: Vec<(String,)> = sqlx::query_as("DELETE FROM materializations WHERE created_at < ? RETURNING materialization_id")
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
