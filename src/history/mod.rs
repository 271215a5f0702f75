//! Per-conversation history persistence.
//!
//! The history blob is opaque, backend-defined JSON. It is stored and passed
//! through verbatim; this module never interprets its contents.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

/// Identity of one ongoing DM relationship: a Slack user within a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId {
    pub user_id: String,
    pub team_id: String,
}

impl ConversationId {
    pub fn new(user_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            team_id: team_id.into(),
        }
    }
}

/// Repository for conversation history rows.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch the history blob for a conversation, creating an empty row on
    /// first reference.
    ///
    /// The composite primary key makes the create race-free: concurrent
    /// callers cannot produce duplicate rows.
    pub async fn get_or_create(&self, id: &ConversationId) -> Result<String> {
        self.ensure_row(id).await?;

        sqlx::query_scalar::<_, String>(
            "SELECT history FROM conversations WHERE user_id = ? AND team_id = ?",
        )
        .bind(&id.user_id)
        .bind(&id.team_id)
        .fetch_one(&self.pool)
        .await
        .context("fetching conversation history")
    }

    /// Replace the history blob for a conversation.
    ///
    /// Performs its own ensure-exists step, so it succeeds even without a
    /// prior `get_or_create` in this process.
    pub async fn put(&self, id: &ConversationId, history: &str) -> Result<()> {
        self.ensure_row(id).await?;

        sqlx::query(
            "UPDATE conversations SET history = ?, updated_at = ? WHERE user_id = ? AND team_id = ?",
        )
        .bind(history)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.user_id)
        .bind(&id.team_id)
        .execute(&self.pool)
        .await
        .context("updating conversation history")?;
        Ok(())
    }

    async fn ensure_row(&self, id: &ConversationId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, team_id, history, updated_at)
            VALUES (?, ?, '[]', ?)
            ON CONFLICT(user_id, team_id) DO NOTHING
            "#,
        )
        .bind(&id.user_id)
        .bind(&id.team_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("creating conversation row")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> HistoryStore {
        let db = Database::in_memory().await.unwrap();
        HistoryStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn missing_row_reads_as_empty_history() {
        let store = store().await;
        let id = ConversationId::new("U1", "T1");

        let history = store.get_or_create(&id).await.unwrap();
        assert_eq!(history, "[]");
    }

    #[tokio::test]
    async fn put_without_prior_get_succeeds() {
        let store = store().await;
        let id = ConversationId::new("U1", "T1");

        store.put(&id, r#"[{"q":"hi"}]"#).await.unwrap();
        assert_eq!(store.get_or_create(&id).await.unwrap(), r#"[{"q":"hi"}]"#);
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = store().await;
        let id = ConversationId::new("U1", "T1");

        store.put(&id, r#"[1,2]"#).await.unwrap();
        let once = store.get_or_create(&id).await.unwrap();
        store.put(&id, r#"[1,2]"#).await.unwrap();
        let twice = store.get_or_create(&id).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn get_then_put_unchanged_round_trips() {
        let store = store().await;
        let id = ConversationId::new("U1", "T1");

        store.put(&id, r#"[{"a":1}]"#).await.unwrap();
        let before = store.get_or_create(&id).await.unwrap();
        store.put(&id, &before).await.unwrap();
        let after = store.get_or_create(&id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let store = store().await;
        let a = ConversationId::new("U1", "T1");
        let b = ConversationId::new("U1", "T2");

        store.put(&a, r#"["a"]"#).await.unwrap();
        assert_eq!(store.get_or_create(&b).await.unwrap(), "[]");
    }
}
