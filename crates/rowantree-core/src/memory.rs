//! In-memory persistence adapter.
//!
//! Implements both ports over `tokio` locks. Used by tests, by the API
//! test suite, and by `infrastructure.backend: memory`. Deleting a user
//! also drops any pending queue entry, matching the cascade in the
//! `PostgreSQL` schema.

use std::collections::BTreeMap;

use chrono::Utc;
use futures::FutureExt;
use rowantree_types::{ActionQueueEntry, LedgerEntry, UserAggregate, UserId};
use tokio::sync::{Mutex, RwLock};

use crate::repository::{
    ActionQueue, RepoFuture, RepositoryError, UserRepository, WorldTotals,
};

/// Process-local user store and action queue.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RwLock<BTreeMap<UserId, UserAggregate>>,
    journal: Mutex<Vec<LedgerEntry>>,
    queue: Mutex<BTreeMap<UserId, ActionQueueEntry>>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every journal line saved for a user, in save order.
    pub async fn journal_for(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.journal
            .lock()
            .await
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl UserRepository for InMemoryStore {
    fn insert_user<'a>(&'a self, aggregate: &'a UserAggregate) -> RepoFuture<'a, ()> {
        async move {
            let mut users = self.users.write().await;
            if users.contains_key(&aggregate.user_id) {
                return Err(RepositoryError::AlreadyExists(aggregate.user_id));
            }
            users.insert(aggregate.user_id, aggregate.clone());
            Ok(())
        }
        .boxed()
    }

    fn load_user(&self, user_id: UserId) -> RepoFuture<'_, UserAggregate> {
        async move {
            self.users
                .read()
                .await
                .get(&user_id)
                .cloned()
                .ok_or(RepositoryError::NotFound(user_id))
        }
        .boxed()
    }

    fn save_user<'a>(
        &'a self,
        aggregate: &'a UserAggregate,
        journal: &'a [LedgerEntry],
    ) -> RepoFuture<'a, u64> {
        async move {
            let mut users = self.users.write().await;
            let stored = users
                .get_mut(&aggregate.user_id)
                .ok_or(RepositoryError::NotFound(aggregate.user_id))?;
            if stored.version != aggregate.version {
                return Err(RepositoryError::Conflict {
                    user_id: aggregate.user_id,
                    expected: aggregate.version,
                });
            }
            let next = aggregate
                .version
                .checked_add(1)
                .ok_or_else(|| RepositoryError::Corrupt("version counter exhausted".to_owned()))?;

            let mut saved = aggregate.clone();
            saved.version = next;
            *stored = saved;
            // Still holding the users write lock.
            self.journal.lock().await.extend_from_slice(journal);
            Ok(next)
        }
        .boxed()
    }

    fn delete_user(&self, user_id: UserId) -> RepoFuture<'_, ()> {
        async move {
            let mut users = self.users.write().await;
            if users.remove(&user_id).is_none() {
                return Err(RepositoryError::NotFound(user_id));
            }
            self.journal
                .lock()
                .await
                .retain(|entry| entry.user_id != user_id);
            self.queue.lock().await.remove(&user_id);
            Ok(())
        }
        .boxed()
    }

    fn list_active_user_ids(&self) -> RepoFuture<'_, Vec<UserId>> {
        async move {
            Ok(self
                .users
                .read()
                .await
                .values()
                .filter(|user| user.active)
                .map(|user| user.user_id)
                .collect())
        }
        .boxed()
    }

    fn world_totals(&self) -> RepoFuture<'_, WorldTotals> {
        async move {
            let users = self.users.read().await;
            let mut totals = WorldTotals::default();
            for user in users.values().filter(|user| user.active) {
                totals.active_user_count = totals.active_user_count.saturating_add(1);
                totals.total_population = totals
                    .total_population
                    .saturating_add(user.total_population());
            }
            Ok(totals)
        }
        .boxed()
    }
}

impl ActionQueue for InMemoryStore {
    fn enqueue(&self, user_id: UserId) -> RepoFuture<'_, bool> {
        async move {
            let mut queue = self.queue.lock().await;
            if queue.contains_key(&user_id) {
                return Ok(false);
            }
            queue.insert(
                user_id,
                ActionQueueEntry {
                    user_id,
                    enqueued_at: Utc::now(),
                },
            );
            Ok(true)
        }
        .boxed()
    }

    fn dequeue_all(&self) -> RepoFuture<'_, Vec<ActionQueueEntry>> {
        async move {
            let drained = std::mem::take(&mut *self.queue.lock().await);
            Ok(drained.into_values().collect())
        }
        .boxed()
    }

    fn depth(&self) -> RepoFuture<'_, u64> {
        async move {
            let len = self.queue.lock().await.len();
            Ok(u64::try_from(len).unwrap_or(u64::MAX))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowantree_types::Store;

    #[tokio::test]
    async fn insert_load_round_trip() {
        let store = InMemoryStore::new();
        let mut user = UserAggregate::new(UserId::new());
        user.stores.insert(Store::Wood, 3);

        assert!(store.insert_user(&user).await.is_ok());
        assert_eq!(store.load_user(user.user_id).await.ok(), Some(user.clone()));
        assert_eq!(
            store.insert_user(&user).await.err(),
            Some(RepositoryError::AlreadyExists(user.user_id))
        );
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let store = InMemoryStore::new();
        let user = UserAggregate::new(UserId::new());
        assert!(store.insert_user(&user).await.is_ok());

        assert_eq!(store.save_user(&user, &[]).await.ok(), Some(1));
        // Same (now stale) version again.
        assert_eq!(
            store.save_user(&user, &[]).await.err(),
            Some(RepositoryError::Conflict {
                user_id: user.user_id,
                expected: 0,
            })
        );
    }

    #[tokio::test]
    async fn enqueue_is_idempotent() {
        let store = InMemoryStore::new();
        let user = UserId::new();

        assert_eq!(store.enqueue(user).await.ok(), Some(true));
        assert_eq!(store.enqueue(user).await.ok(), Some(false));
        assert_eq!(store.depth().await.ok(), Some(1));

        let drained = store.dequeue_all().await.unwrap_or_default();
        assert_eq!(drained.len(), 1);
        assert_eq!(store.depth().await.ok(), Some(0));
    }

    #[tokio::test]
    async fn delete_cascades_to_queue() {
        let store = InMemoryStore::new();
        let user = UserAggregate::new(UserId::new());
        assert!(store.insert_user(&user).await.is_ok());
        assert!(store.enqueue(user.user_id).await.is_ok());

        assert!(store.delete_user(user.user_id).await.is_ok());
        assert_eq!(store.depth().await.ok(), Some(0));
        assert_eq!(
            store.load_user(user.user_id).await.err(),
            Some(RepositoryError::NotFound(user.user_id))
        );
    }

    #[tokio::test]
    async fn totals_count_active_users_only() {
        let store = InMemoryStore::new();
        let mut active = UserAggregate::new(UserId::new());
        active.population.insert("settlers".into(), 4);
        let mut idle = UserAggregate::new(UserId::new());
        idle.active = false;
        idle.population.insert("settlers".into(), 9);

        assert!(store.insert_user(&active).await.is_ok());
        assert!(store.insert_user(&idle).await.is_ok());

        let totals = store.world_totals().await.unwrap_or_default();
        assert_eq!(totals.active_user_count, 1);
        assert_eq!(totals.total_population, 4);
        assert_eq!(
            store.list_active_user_ids().await.unwrap_or_default(),
            vec![active.user_id]
        );
    }
}
