//! Persistence ports.
//!
//! The engine talks to storage only through these two traits. Both are
//! object-safe (methods return boxed futures) so the server can pick an
//! adapter at startup and hand the engine an `Arc<dyn ...>`.
//!
//! Adapters own timeouts and retries. The engine never retries a failed
//! call.

use futures::future::BoxFuture;
use rowantree_types::{ActionQueueEntry, LedgerEntry, UserAggregate, UserId};

/// Errors returned by persistence adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// No user has this id.
    #[error("user {0} not found")]
    NotFound(UserId),

    /// A user with this id already exists.
    #[error("user {0} already exists")]
    AlreadyExists(UserId),

    /// The stored version moved on since the aggregate was loaded.
    #[error("version conflict for user {user_id}: expected version {expected}")]
    Conflict {
        /// The user being saved.
        user_id: UserId,
        /// The version the caller loaded.
        expected: u64,
    },

    /// Stored data could not be mapped back to domain types.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// The backend failed (connection, query, protocol).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Convenience alias for adapter futures.
pub type RepoFuture<'a, T> = BoxFuture<'a, Result<T, RepositoryError>>;

/// Population and activity totals across all users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldTotals {
    /// Users with the active flag set.
    pub active_user_count: u64,
    /// Population summed over active users.
    pub total_population: u64,
}

/// Storage of user aggregates.
pub trait UserRepository: Send + Sync {
    /// Store a new aggregate. Its version is stored as given.
    fn insert_user<'a>(&'a self, aggregate: &'a UserAggregate) -> RepoFuture<'a, ()>;

    /// Load a user's full aggregate.
    fn load_user(&self, user_id: UserId) -> RepoFuture<'_, UserAggregate>;

    /// Replace a user's aggregate and append its journal, atomically.
    ///
    /// Succeeds only if the stored version equals `aggregate.version`;
    /// returns the new version (`aggregate.version + 1`).
    fn save_user<'a>(
        &'a self,
        aggregate: &'a UserAggregate,
        journal: &'a [LedgerEntry],
    ) -> RepoFuture<'a, u64>;

    /// Remove a user and everything it owns.
    fn delete_user(&self, user_id: UserId) -> RepoFuture<'_, ()>;

    /// Ids of every active user.
    fn list_active_user_ids(&self) -> RepoFuture<'_, Vec<UserId>>;

    /// Active user count and their summed population.
    fn world_totals(&self) -> RepoFuture<'_, WorldTotals>;
}

/// The set of users waiting for the next world tick.
pub trait ActionQueue: Send + Sync {
    /// Queue a user. Returns `false` if the user was already pending.
    fn enqueue(&self, user_id: UserId) -> RepoFuture<'_, bool>;

    /// Remove and return every pending entry.
    fn dequeue_all(&self) -> RepoFuture<'_, Vec<ActionQueueEntry>>;

    /// Number of pending users.
    fn depth(&self) -> RepoFuture<'_, u64>;
}
