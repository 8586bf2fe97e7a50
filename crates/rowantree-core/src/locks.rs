//! Per-user mutual exclusion.
//!
//! Each user's stores, population, and features form one exclusion
//! domain. Operations on the same user queue behind one async mutex;
//! operations on different users never contend. Idle entries are pruned
//! once the registry grows past [`PRUNE_THRESHOLD`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use rowantree_types::UserId;
use tokio::sync::OwnedMutexGuard;

/// Registry size at which idle entries are dropped.
pub const PRUNE_THRESHOLD: usize = 1024;

/// Held for the duration of one operation on one user.
pub type UserGuard = OwnedMutexGuard<()>;

/// Registry of per-user async mutexes.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<BTreeMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one user.
    pub async fn lock(&self, user_id: UserId) -> UserGuard {
        let mutex = self.mutex_for(user_id);
        mutex.lock_owned().await
    }

    /// Number of users with a registered mutex.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no mutex is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutex_for(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() >= PRUNE_THRESHOLD {
            // Only the registry holds an idle entry's Arc.
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        }
        Arc::clone(locks.entry(user_id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_user_is_serialised() {
        let locks = Arc::new(UserLocks::new());
        let user = UserId::new();

        let held = locks.lock(user).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        assert!(contender.await.is_ok());
    }

    #[tokio::test]
    async fn different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _first = locks.lock(UserId::new()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(UserId::new())).await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = UserLocks::new();
        for _ in 0..PRUNE_THRESHOLD {
            let _guard = locks.lock(UserId::new()).await;
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD);

        let held = locks.lock(UserId::new()).await;
        assert_eq!(locks.len(), 1);
        drop(held);
    }
}
