//! `kanban_cards` storage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct KanbanCard {
    pub card_id: String,
    pub case_id: String,
    pub status: String,
    pub blocked_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

pub async fn get(pool: &DbPool, card_id: &str) -> Result<Option<KanbanCard>, StorageError> {
    sqlx::query_as("SELECT * FROM kanban_cards WHERE card_id = ?")
        .bind(card_id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn upsert(
    pool: &DbPool,
    card_id: &str,
    case_id: &str,
    status: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO kanban_cards (card_id, case_id, status, blocked_reason, resolved_at, last_activity_at)
         VALUES (?, ?, ?, NULL, NULL, ?)
         ON CONFLICT(card_id) DO UPDATE SET
            case_id = excluded.case_id,
            status = excluded.status,
            last_activity_at = excluded.last_activity_at",
    )
    .bind(card_id)
    .bind(case_id)
    .bind(status)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Apply a card-status transition. Caller has already run guardrails; this performs the
/// unconditional write.
pub async fn apply_status_update(
    pool: &DbPool,
    card_id: &str,
    new_status: &str,
    blocked_reason: Option<&str>,
    resolved_at: Option<DateTime<Utc>>,
) -> Result<KanbanCard, StorageError> {
    sqlx::query(
        "UPDATE kanban_cards
         SET status = ?,
             blocked_reason = CASE WHEN ? = 'blocked' THEN ? ELSE NULL END,
             resolved_at = CASE WHEN ? = 'resolved' THEN ? ELSE NULL END,
             last_activity_at = ?
         WHERE card_id = ?",
    )
    .bind(new_status)
    .bind(new_status)
    .bind(blocked_reason)
    .bind(new_status)
    .bind(resolved_at)
    .bind(Utc::now())
    .bind(card_id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    get(pool, card_id)
        .await?
        .ok_or_else(|| StorageError::Query {
            source: sqlx::Error::RowNotFound,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn apply_status_update_sets_blocked_reason() {
        let pool = init_test_db().await.unwrap();
        upsert(&pool, "card-1", "case-1", "todo").await.unwrap();
        let card = apply_status_update(&pool, "card-1", "blocked", Some("waiting on vendor"), None)
            .await
            .unwrap();
        assert_eq!(card.status, "blocked");
        assert_eq!(card.blocked_reason.as_deref(), Some("waiting on vendor"));
        assert!(card.resolved_at.is_none());
    }

    #[tokio::test]
    async fn apply_status_update_clears_blocked_reason_on_other_transitions() {
        let pool = init_test_db().await.unwrap();
        upsert(&pool, "card-1", "case-1", "blocked").await.unwrap();
        sqlx::query("UPDATE kanban_cards SET blocked_reason = 'x' WHERE card_id = 'card-1'")
            .execute(&pool)
            .await
            .unwrap();
        let card = apply_status_update(&pool, "card-1", "in_progress", None, None)
            .await
            .unwrap();
        assert!(card.blocked_reason.is_none());
    }
}
