use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::core::pair::PairKey;
use crate::core::store::{BlockOutcome, MessageStore, RelationshipStore, Transition};
use crate::models::{Conversation, EdgeKind, Intent, MatchRecord, Message, NewMessage, RelationshipEdge};

/// Errors raised by relationship and message storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, kind, created_at, is_read, read_at, is_deleted";

/// PostgreSQL-backed relationship and message storage
///
/// Pair transitions run inside one transaction holding a transaction-scoped
/// advisory lock derived from the canonical pair key, so concurrent `act` and
/// `block` calls on the same pair serialize while other pairs proceed.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store from optional settings, falling back to sane pool defaults
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        content: row.try_get("content")?,
        kind: row.try_get("kind")?,
        created_at: row.try_get("created_at")?,
        is_read: row.try_get("is_read")?,
        read_at: row.try_get("read_at")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<MatchRecord, StoreError> {
    Ok(MatchRecord {
        user_id: row.try_get("user_id")?,
        other_user_id: row.try_get("other_user_id")?,
        matched_at: row.try_get("matched_at")?,
    })
}

#[async_trait]
impl RelationshipStore for PostgresStore {
    async fn act(&self, actor: &str, target: &str, intent: Intent) -> Result<Transition, StoreError> {
        let key = PairKey::new(actor, target).to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM relationship_edges
                WHERE kind_class = 'block'
                  AND ((source_id = $1 AND target_id = $2) OR (source_id = $2 AND target_id = $1))
            )
            "#,
        )
        .bind(actor)
        .bind(target)
        .fetch_one(&mut *tx)
        .await?;

        if blocked {
            tx.rollback().await?;
            return Ok(Transition::Refused);
        }

        sqlx::query(
            r#"
            INSERT INTO relationship_edges (source_id, target_id, kind_class, kind, created_at)
            VALUES ($1, $2, 'intent', $3, NOW())
            ON CONFLICT (source_id, target_id, kind_class)
            DO UPDATE SET
                kind = EXCLUDED.kind,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(actor)
        .bind(target)
        .bind(intent.edge_kind())
        .execute(&mut *tx)
        .await?;

        if intent == Intent::Dislike {
            let removed = sqlx::query(
                r#"
                DELETE FROM matches
                WHERE (user_id = $1 AND other_user_id = $2) OR (user_id = $2 AND other_user_id = $1)
                "#,
            )
            .bind(actor)
            .bind(target)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            if removed.rows_affected() > 0 {
                tracing::debug!("Dislike dissolved match {} <-> {}", actor, target);
            }
            return Ok(Transition::Pending);
        }

        let reciprocal: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM relationship_edges
                WHERE source_id = $1 AND target_id = $2 AND kind = 'liked'
            )
            "#,
        )
        .bind(target)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        if !reciprocal {
            tx.commit().await?;
            return Ok(Transition::Pending);
        }

        let existing: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT matched_at FROM matches WHERE user_id = $1 AND other_user_id = $2",
        )
        .bind(actor)
        .bind(target)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(matched_at) = existing {
            tx.commit().await?;
            return Ok(Transition::Matched { newly: false, matched_at });
        }

        let matched_at = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO matches (user_id, other_user_id, matched_at)
            VALUES ($1, $2, $3), ($2, $1, $3)
            ON CONFLICT (user_id, other_user_id) DO NOTHING
            "#,
        )
        .bind(actor)
        .bind(target)
        .bind(matched_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Transition::Matched { newly: inserted.rows_affected() > 0, matched_at })
    }

    async fn block(&self, actor: &str, target: &str) -> Result<BlockOutcome, StoreError> {
        let key = PairKey::new(actor, target).to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO relationship_edges (source_id, target_id, kind_class, kind, created_at)
            VALUES ($1, $2, 'block', 'blocked', NOW())
            ON CONFLICT (source_id, target_id, kind_class) DO NOTHING
            "#,
        )
        .bind(actor)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM relationship_edges
            WHERE source_id = $1 AND target_id = $2 AND kind = 'liked'
            "#,
        )
        .bind(actor)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM matches
            WHERE (user_id = $1 AND other_user_id = $2) OR (user_id = $2 AND other_user_id = $1)
            "#,
        )
        .bind(actor)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BlockOutcome {
            unmatched: removed.rows_affected() > 0,
            already_blocked: inserted.rows_affected() == 0,
        })
    }

    async fn is_matched(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let matched: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM matches WHERE user_id = $1 AND other_user_id = $2)",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(matched)
    }

    async fn exclusions(&self, user: &str) -> Result<HashSet<String>, StoreError> {
        let query = r#"
            SELECT target_id AS other_id FROM relationship_edges WHERE source_id = $1
            UNION
            SELECT source_id FROM relationship_edges WHERE target_id = $1 AND kind = 'blocked'
            UNION
            SELECT other_user_id FROM matches WHERE user_id = $1
        "#;

        let ids: Vec<String> = sqlx::query_scalar(query)
            .bind(user)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("User {} excludes {} profiles", user, ids.len());

        Ok(ids.into_iter().filter(|id| id != user).collect())
    }

    async fn matches_for(&self, user: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, other_user_id, matched_at
            FROM matches
            WHERE user_id = $1
            ORDER BY matched_at DESC, other_user_id
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn edges_from(&self, user: &str) -> Result<Vec<RelationshipEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, target_id, kind, created_at
            FROM relationship_edges
            WHERE source_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RelationshipEdge {
                    source_id: row.try_get("source_id")?,
                    target_id: row.try_get("target_id")?,
                    kind: row.try_get::<EdgeKind, _>("kind")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.ping().await
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let query = format!(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, clock_timestamp())
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&message.sender_id)
            .bind(&message.receiver_id)
            .bind(&message.content)
            .bind(message.kind)
            .fetch_one(&self.pool)
            .await?;

        message_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND NOT is_deleted");

        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn history(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let query = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
              AND NOT is_deleted
            ORDER BY created_at, seq
            "#
        );

        let rows = sqlx::query(&query)
            .bind(a)
            .bind(b)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn mark_conversation_read(
        &self,
        reader: &str,
        other: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = $3
            WHERE sender_id = $2 AND receiver_id = $1 AND NOT is_read AND NOT is_deleted
            "#,
        )
        .bind(reader)
        .bind(other)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_read(&self, reader: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = $3
            WHERE id = $2 AND receiver_id = $1 AND NOT is_read AND NOT is_deleted
            "#,
        )
        .bind(reader)
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, sender: &str, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET is_deleted = TRUE WHERE id = $2 AND sender_id = $1 AND NOT is_deleted",
        )
        .bind(sender)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, StoreError> {
        let query = r#"
            WITH visible AS (
                SELECT m.*,
                       CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END AS other_user_id
                FROM messages m
                WHERE (m.sender_id = $1 OR m.receiver_id = $1) AND NOT m.is_deleted
            ),
            latest AS (
                SELECT DISTINCT ON (other_user_id) *
                FROM visible
                ORDER BY other_user_id, created_at DESC, seq DESC
            ),
            unread AS (
                SELECT other_user_id,
                       COUNT(*) FILTER (WHERE receiver_id = $1 AND NOT is_read) AS unread_count
                FROM visible
                GROUP BY other_user_id
            )
            SELECT latest.id, latest.sender_id, latest.receiver_id, latest.content, latest.kind,
                   latest.created_at, latest.is_read, latest.read_at, latest.is_deleted,
                   latest.other_user_id, unread.unread_count
            FROM latest
            JOIN unread USING (other_user_id)
            ORDER BY latest.created_at DESC, latest.other_user_id
        "#;

        let rows = sqlx::query(query).bind(viewer).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let unread: i64 = row.try_get("unread_count")?;
                let last_message = message_from_row(row)?;
                Ok(Conversation {
                    other_user_id: row.try_get("other_user_id")?,
                    unread_count: u64::try_from(unread)
                        .map_err(|_| StoreError::Corrupt(format!("negative unread count {unread}")))?,
                    last_activity_at: last_message.created_at,
                    last_message: Some(last_message),
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.ping().await
    }
}
