//! Postgres-backed history store
//!
//! One row per message. Order comes from the `position` column; the
//! `(session_key, position)` primary key also rejects two writers racing to
//! append at the same slot from different processes.

use super::HistoryStore;
use crate::error::HistoryError;
use crate::models::{Message, MessageMetadata, Role};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

pub struct PostgresHistoryStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn storage_error(context: &str, e: impl std::fmt::Display) -> HistoryError {
    HistoryError::StorageFailure(format!("{}: {}", context, e))
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Build a pool without connecting; the first query opens a connection.
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|e| storage_error("Failed to build postgres pool", e))?;

        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_messages (
                      session_key TEXT NOT NULL,
                      position BIGINT NOT NULL,
                      message_id UUID NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      token_count INTEGER NOT NULL,
                      is_summary BOOLEAN NOT NULL DEFAULT FALSE,
                      metadata TEXT,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (session_key, position)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| storage_error("Failed to initialize history schema", e))?;

        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.ensure_schema().await?;
        self.pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin history transaction", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit history transaction", e))
    }
}

/// Metadata is stored as JSON text; empty metadata as NULL.
fn encode_metadata(metadata: &MessageMetadata) -> Result<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(metadata)
        .map(Some)
        .map_err(|e| storage_error("Failed to encode message metadata", e))
}

fn decode_metadata(raw: Option<String>) -> Result<MessageMetadata> {
    match raw {
        None => Ok(MessageMetadata::default()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| storage_error("Corrupt message metadata", e)),
    }
}

fn decode_role(raw: &str) -> Result<Role> {
    Role::parse(raw)
        .ok_or_else(|| HistoryError::StorageFailure(format!("Corrupt message role: {:?}", raw)))
}

fn decode_row(row: &PgRow) -> Result<Message> {
    let column = |name: &str, e: sqlx::Error| storage_error(&format!("Corrupt column {}", name), e);

    let role: String = row.try_get("role").map_err(|e| column("role", e))?;
    let token_count: i32 = row.try_get("token_count").map_err(|e| column("token_count", e))?;
    let timestamp: DateTime<Utc> = row.try_get("created_at").map_err(|e| column("created_at", e))?;
    let message_id: Uuid = row.try_get("message_id").map_err(|e| column("message_id", e))?;

    Ok(Message {
        message_id,
        timestamp,
        role: decode_role(&role)?,
        content: row.try_get("content").map_err(|e| column("content", e))?,
        token_count: token_count.max(0) as usize,
        is_summary: row.try_get("is_summary").map_err(|e| column("is_summary", e))?,
        metadata: decode_metadata(row.try_get("metadata").map_err(|e| column("metadata", e))?)?,
    })
}

/// Positions for `count` rows written after `last_position`.
///
/// `None` means the session holds no rows, so numbering starts at 0.
fn message_positions(last_position: Option<i64>, count: usize) -> impl Iterator<Item = i64> {
    let first = last_position.map_or(0, |last| last + 1);
    (first..).take(count)
}

async fn insert_messages(
    tx: &mut Transaction<'static, Postgres>,
    session_key: &str,
    last_position: Option<i64>,
    messages: &[Message],
) -> Result<()> {
    let positions = message_positions(last_position, messages.len());
    for (position, msg) in positions.zip(messages) {
        sqlx::query(
            r#"
            INSERT INTO session_messages
              (session_key, position, message_id, role, content, token_count, is_summary, metadata, created_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session_key)
        .bind(position)
        .bind(msg.message_id)
        .bind(msg.role.as_str())
        .bind(&msg.content)
        .bind(msg.token_count as i32)
        .bind(msg.is_summary)
        .bind(encode_metadata(&msg.metadata)?)
        .bind(msg.timestamp)
        .execute(&mut **tx)
        .await
        .map_err(|e| storage_error("Failed to insert history message", e))?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn load(&self, session_key: &str) -> Result<Vec<Message>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT message_id, role, content, token_count, is_summary, metadata, created_at
            FROM session_messages
            WHERE session_key = $1
            ORDER BY position ASC
            "#,
        )
        .bind(session_key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to load history", e))?;

        rows.iter().map(decode_row).collect()
    }

    async fn replace(&self, session_key: &str, messages: Vec<Message>) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM session_messages WHERE session_key = $1")
            .bind(session_key)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to clear old history", e))?;

        insert_messages(&mut tx, session_key, None, &messages).await?;
        Self::commit(tx).await
    }

    async fn append(&self, session_key: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "SELECT MAX(position) AS last_position FROM session_messages WHERE session_key = $1",
        )
        .bind(session_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to read history tail", e))?;

        let last_position: Option<i64> = row
            .try_get("last_position")
            .map_err(|e| storage_error("Corrupt history tail", e))?;

        insert_messages(&mut tx, session_key, last_position, &messages).await?;
        Self::commit(tx).await
    }

    async fn remove(&self, session_key: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM session_messages WHERE session_key = $1")
            .bind(session_key)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to remove history", e))?;

        Ok(())
    }

    async fn session_keys(&self) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT DISTINCT session_key FROM session_messages ORDER BY session_key ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list sessions", e))?;

        rows.iter()
            .map(|row| {
                row.try_get("session_key")
                    .map_err(|e| storage_error("Corrupt column session_key", e))
            })
            .collect()
    }
}
