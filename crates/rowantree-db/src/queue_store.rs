//! `PostgreSQL` implementation of the [`ActionQueue`] port.
//!
//! The queue is the `action_queue` table keyed by `user_id`, so a second
//! enqueue of a pending user hits `ON CONFLICT DO NOTHING`. Draining is a
//! single `DELETE ... RETURNING`, which hands each row to exactly one
//! caller even with several engines on one database.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rowantree_core::{ActionQueue, RepoFuture, RepositoryError};
use rowantree_types::{ActionQueueEntry, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, from_db};

/// The action queue in `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresActionQueue {
    pool: PgPool,
}

impl PostgresActionQueue {
    /// Create a queue over a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Queue a user. Returns `false` if already pending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails, including when the
    /// user does not exist.
    pub async fn push(&self, user_id: UserId) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"INSERT INTO action_queue (user_id, enqueued_at)
              VALUES ($1, $2)
              ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id.into_inner())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove and return every pending entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn drain(&self) -> Result<Vec<ActionQueueEntry>, DbError> {
        let mut rows = sqlx::query_as::<_, QueueRow>(
            r"DELETE FROM action_queue RETURNING user_id, enqueued_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.sort_by_key(|row| (row.enqueued_at, row.user_id));

        tracing::debug!(count = rows.len(), "Drained action queue");
        Ok(rows
            .into_iter()
            .map(|row| ActionQueueEntry {
                user_id: UserId::from(row.user_id),
                enqueued_at: row.enqueued_at,
            })
            .collect())
    }

    /// Number of pending users.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the count fails.
    pub async fn pending(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(r"SELECT COUNT(*) FROM action_queue")
            .fetch_one(&self.pool)
            .await?;
        from_db(count, "queue depth")
    }
}

impl ActionQueue for PostgresActionQueue {
    fn enqueue(&self, user_id: UserId) -> RepoFuture<'_, bool> {
        async move { self.push(user_id).await.map_err(RepositoryError::from) }.boxed()
    }

    fn dequeue_all(&self) -> RepoFuture<'_, Vec<ActionQueueEntry>> {
        async move { self.drain().await.map_err(RepositoryError::from) }.boxed()
    }

    fn depth(&self) -> RepoFuture<'_, u64> {
        async move { self.pending().await.map_err(RepositoryError::from) }.boxed()
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    user_id: Uuid,
    enqueued_at: DateTime<Utc>,
}
