//! `Dragonfly` (Redis-compatible) action queue.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `queue:pending` | Set | Ids of users waiting for the next tick |
//! | `queue:entries` | Hash | User id to JSON [`ActionQueueEntry`] |
//!
//! `SADD` is idempotent, so re-enqueueing a pending user is a no-op. The
//! set member and its entry are written in one `MULTI`, with `HSETNX` so
//! the first enqueue time of the cycle is kept.
//!
//! Draining pops the whole set with `SPOP`, then reads and deletes the
//! entries. If the entry read fails the popped ids go back into the set.
//! A popped id whose entry is missing or unreadable is still returned,
//! stamped with the drain time; a member that is not a user id at all is
//! logged and dropped without failing the drain.

use std::str::FromStr;

use chrono::Utc;
use fred::interfaces::TransactionInterface;
use fred::prelude::*;
use futures::FutureExt;
use rowantree_core::{ActionQueue, RepoFuture, RepositoryError};
use rowantree_types::{ActionQueueEntry, UserId};

use crate::error::DbError;

/// Set of pending user ids.
const PENDING_KEY: &str = "queue:pending";

/// Hash of pending entries.
const ENTRIES_KEY: &str = "queue:entries";

/// Ids popped per `SPOP` round trip while draining.
const DRAIN_BATCH: usize = 256;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// The action queue as a `Dragonfly` set.
#[derive(Clone)]
pub struct DragonflyActionQueue {
    client: Client,
}

impl DragonflyActionQueue {
    /// Create a queue on an existing connection.
    pub fn new(pool: &DragonflyPool) -> Self {
        Self {
            client: pool.client().clone(),
        }
    }

    /// Queue a user. Returns `false` if already pending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the transaction fails.
    pub async fn push(&self, user_id: UserId) -> Result<bool, DbError> {
        let id = user_id.to_string();
        let entry = ActionQueueEntry {
            user_id,
            enqueued_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry)?;

        let trx = self.client.multi();
        let _: () = trx.sadd(PENDING_KEY, id.as_str()).await?;
        let _: () = trx.hsetnx(ENTRIES_KEY, id.as_str(), json.as_str()).await?;
        let (added, _): (u32, u32) = trx.exec(true).await?;
        Ok(added > 0)
    }

    /// Remove and return every pending entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if popping or reading entries fails.
    /// Ids popped before the failure are put back first.
    pub async fn drain(&self) -> Result<Vec<ActionQueueEntry>, DbError> {
        let mut popped: Vec<String> = Vec::new();
        loop {
            let batch: Vec<String> = match self.client.spop(PENDING_KEY, Some(DRAIN_BATCH)).await {
                Ok(batch) => batch,
                Err(error) => return Err(self.restore(&popped, DbError::from(error)).await),
            };
            if batch.is_empty() {
                break;
            }
            popped.extend(batch);
        }
        if popped.is_empty() {
            return Ok(Vec::new());
        }

        let stored: Vec<Option<String>> =
            match self.client.hmget(ENTRIES_KEY, popped.clone()).await {
                Ok(stored) => stored,
                Err(error) => return Err(self.restore(&popped, DbError::from(error)).await),
            };

        // The ids are in hand; a leftover entry is only a stale timestamp.
        let removed: Result<u32, fred::error::Error> =
            self.client.hdel(ENTRIES_KEY, popped.clone()).await;
        if let Err(error) = removed {
            tracing::warn!(%error, "Failed to delete drained queue entries");
        }

        let drained = decode_batch(&popped, &stored);
        tracing::debug!(count = drained.len(), "Drained action queue");
        Ok(drained)
    }

    /// Put popped ids back into the pending set, then hand back `error`.
    async fn restore(&self, ids: &[String], error: DbError) -> DbError {
        if ids.is_empty() {
            return error;
        }
        let restored: Result<u32, fred::error::Error> =
            self.client.sadd(PENDING_KEY, ids.to_vec()).await;
        match restored {
            Ok(_) => tracing::warn!(count = ids.len(), %error, "Drain failed, ids restored"),
            Err(restore) => tracing::error!(
                count = ids.len(),
                %error,
                restore_error = %restore,
                "Drain failed and popped ids could not be restored"
            ),
        }
        error
    }

    /// Number of pending users.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn pending(&self) -> Result<u64, DbError> {
        let count: u64 = self.client.scard(PENDING_KEY).await?;
        Ok(count)
    }
}

impl ActionQueue for DragonflyActionQueue {
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

/// Decode popped ids and their stored entries, oldest first. Members that
/// are not user ids are logged and skipped.
fn decode_batch(ids: &[String], stored: &[Option<String>]) -> Vec<ActionQueueEntry> {
    let mut entries: Vec<ActionQueueEntry> = ids
        .iter()
        .zip(stored.iter().map(Option::as_deref).chain(std::iter::repeat(None)))
        .filter_map(|(id, json)| match decode_entry(id, json) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(member = %id, %error, "Dropping unreadable queue member");
                None
            }
        })
        .collect();
    entries.sort_by_key(|entry| (entry.enqueued_at, entry.user_id));
    entries
}

/// Decode one popped member. Only a member that is not a user id is an
/// error; a missing or unreadable entry falls back to the current time.
fn decode_entry(id: &str, json: Option<&str>) -> Result<ActionQueueEntry, DbError> {
    let user_id = UserId::from_str(id)
        .map_err(|e| DbError::Corrupt(format!("{PENDING_KEY} member {id:?}: {e}")))?;
    let stored = json.map(serde_json::from_str::<ActionQueueEntry>);
    match stored {
        Some(Ok(entry)) if entry.user_id == user_id => Ok(entry),
        None => Ok(ActionQueueEntry {
            user_id,
            enqueued_at: Utc::now(),
        }),
        Some(_) => {
            tracing::warn!(user_id = %user_id, "Unreadable queue entry, using drain time");
            Ok(ActionQueueEntry {
                user_id,
                enqueued_at: Utc::now(),
            })
        }
    }
}
