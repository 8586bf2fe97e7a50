//! End-to-end properties of the engine over the in-memory adapter.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use rowantree_core::{
    ActionQueue, EconomyEngine, ErrorKind, InMemoryStore, RepoFuture, RepositoryError, TickPhase,
    UserRepository, WorldTotals,
};
use rowantree_economy::{
    EconomyRules, FeatureRule, MerchantRecipe, StartingState, TierRule, TransportRoute,
    UnlockPredicate,
};
use rowantree_types::{
    ActionQueueEntry, FeatureId, LedgerEntry, RecipeId, Store, StoreAmount, TierId, UserAggregate,
    UserId,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn test_rules() -> EconomyRules {
    EconomyRules {
        starting: StartingState {
            active: true,
            stores: BTreeMap::new(),
            incomes: BTreeMap::new(),
            population: BTreeMap::new(),
        },
        tiers: vec![
            TierRule {
                id: TierId::from("a"),
                income_bonus_pct: 0,
            },
            TierRule {
                id: TierId::from("b"),
                income_bonus_pct: 0,
            },
        ],
        routes: vec![TransportRoute {
            from: TierId::from("a"),
            to: TierId::from("b"),
            bidirectional: true,
            cost: BTreeMap::new(),
        }],
        growth: Vec::new(),
        features: vec![FeatureRule {
            id: FeatureId::from("vault"),
            description: "A place for gems.".to_owned(),
            unlock: UnlockPredicate::StoreAtLeast {
                store: Store::Gem,
                amount: 1,
            },
            cost: BTreeMap::new(),
            reward: BTreeMap::new(),
            grants_income: BTreeMap::new(),
        }],
        merchants: vec![MerchantRecipe {
            id: RecipeId::from("gold_for_gem"),
            input: StoreAmount {
                store: Store::Gold,
                amount: 100,
            },
            output: StoreAmount {
                store: Store::Gem,
                amount: 1,
            },
            requires_feature: None,
        }],
    }
}

fn engine_over(users: Arc<dyn UserRepository>, queue: Arc<dyn ActionQueue>) -> Arc<EconomyEngine> {
    Arc::new(EconomyEngine::new(users, queue, Arc::new(test_rules())).with_concurrency(4))
}

fn engine() -> (Arc<InMemoryStore>, Arc<EconomyEngine>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine_over(
        Arc::clone(&store) as Arc<dyn UserRepository>,
        Arc::clone(&store) as Arc<dyn ActionQueue>,
    );
    (store, engine)
}

async fn seeded_user(store: &InMemoryStore, build: impl FnOnce(&mut UserAggregate)) -> UserId {
    let mut user = UserAggregate::new(UserId::new());
    build(&mut user);
    let id = user.user_id;
    store.insert_user(&user).await.unwrap();
    store.enqueue(id).await.unwrap();
    id
}

/// Delegates to an [`InMemoryStore`] but fails every save for one user.
struct FailingSaves {
    inner: Arc<InMemoryStore>,
    victim: UserId,
}

impl UserRepository for FailingSaves {
    fn insert_user<'a>(&'a self, aggregate: &'a UserAggregate) -> RepoFuture<'a, ()> {
        self.inner.insert_user(aggregate)
    }

    fn load_user(&self, user_id: UserId) -> RepoFuture<'_, UserAggregate> {
        self.inner.load_user(user_id)
    }

    fn save_user<'a>(
        &'a self,
        aggregate: &'a UserAggregate,
        journal: &'a [LedgerEntry],
    ) -> RepoFuture<'a, u64> {
        if aggregate.user_id == self.victim {
            return async { Err(RepositoryError::Backend("disk on fire".to_owned())) }.boxed();
        }
        self.inner.save_user(aggregate, journal)
    }

    fn delete_user(&self, user_id: UserId) -> RepoFuture<'_, ()> {
        self.inner.delete_user(user_id)
    }

    fn list_active_user_ids(&self) -> RepoFuture<'_, Vec<UserId>> {
        self.inner.list_active_user_ids()
    }

    fn world_totals(&self) -> RepoFuture<'_, WorldTotals> {
        self.inner.world_totals()
    }
}

/// A queue whose backend is unreachable for writes.
struct DownQueue;

impl ActionQueue for DownQueue {
    fn enqueue(&self, _user_id: UserId) -> RepoFuture<'_, bool> {
        async { Err(RepositoryError::Backend("queue unreachable".to_owned())) }.boxed()
    }

    fn dequeue_all(&self) -> RepoFuture<'_, Vec<ActionQueueEntry>> {
        async { Ok(Vec::new()) }.boxed()
    }

    fn depth(&self) -> RepoFuture<'_, u64> {
        async { Ok(0) }.boxed()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_applies_income() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 5);
        u.incomes.insert(Store::Gold, rowantree_types::IncomeSource::enabled(10));
    })
    .await;

    let report = engine.process_tick().await.unwrap();
    assert_eq!(report.committed, vec![user]);
    assert!(report.failures.is_empty());

    let stores = engine.stores(user).await.unwrap();
    assert_eq!(stores.get(&Store::Gold), Some(&15));
}

#[tokio::test]
async fn transform_gold_for_gem() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 100);
    })
    .await;

    engine.transform(user, &RecipeId::from("gold_for_gem")).await.unwrap();

    let stores = engine.stores(user).await.unwrap();
    assert_eq!(stores[&Store::Gold], 0);
    assert_eq!(stores.get(&Store::Gem), Some(&1));
}

#[tokio::test]
async fn short_transform_leaves_ledger_unchanged() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 50);
    })
    .await;

    let result = engine.transform(user, &RecipeId::from("gold_for_gem")).await;
    assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InsufficientResources));

    let stores = engine.stores(user).await.unwrap();
    assert_eq!(stores, BTreeMap::from([(Store::Gold, 50)]));
    assert!(store.journal_for(user).await.is_empty());
}

#[tokio::test]
async fn transport_moves_three_from_a_to_b() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.population.insert(TierId::from("a"), 5);
        u.population.insert(TierId::from("b"), 0);
    })
    .await;

    let counts = engine
        .transport(user, &TierId::from("a"), &TierId::from("b"), 3)
        .await
        .unwrap();
    assert_eq!(counts.get(&TierId::from("a")), Some(&2));
    assert_eq!(counts.get(&TierId::from("b")), Some(&3));
}

// ---------------------------------------------------------------------------
// Tick properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_user_is_untouched_by_the_tick() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Wood, 7);
    })
    .await;
    let before = store.load_user(user).await.unwrap();

    let report = engine.process_tick().await.unwrap();
    assert_eq!(report.committed, vec![user]);

    // Not even the version moves.
    assert_eq!(store.load_user(user).await.unwrap(), before);
}

#[tokio::test]
async fn one_failing_user_does_not_stop_the_others() {
    let inner = Arc::new(InMemoryStore::new());
    let victim = seeded_user(&inner, |u| {
        u.stores.insert(Store::Gold, 5);
        u.incomes.insert(Store::Gold, rowantree_types::IncomeSource::enabled(10));
    })
    .await;
    let healthy = seeded_user(&inner, |u| {
        u.stores.insert(Store::Gold, 5);
        u.incomes.insert(Store::Gold, rowantree_types::IncomeSource::enabled(10));
    })
    .await;

    let users = Arc::new(FailingSaves {
        inner: Arc::clone(&inner),
        victim,
    });
    let engine = engine_over(users, Arc::clone(&inner) as Arc<dyn ActionQueue>);

    let report = engine.process_tick().await.unwrap();
    assert_eq!(report.committed, vec![healthy]);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.user_id, victim);
    assert_eq!(failure.kind, ErrorKind::PersistenceFailure);
    // Growth succeeded; the save did not.
    assert_eq!(failure.phase, TickPhase::Committing);

    // The victim keeps its pre-tick state and leaves the queue.
    assert_eq!(inner.load_user(victim).await.unwrap().store(Store::Gold), 5);
    assert_eq!(inner.load_user(healthy).await.unwrap().store(Store::Gold), 15);
    assert_eq!(inner.depth().await.unwrap(), 0);

    // Eligible again on the next cycle.
    assert_eq!(engine.enqueue_active_users().await.unwrap(), 2);
}

#[tokio::test]
async fn deleted_user_in_queue_is_reported_not_found() {
    let users = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryStore::new());
    let engine = engine_over(
        Arc::clone(&users) as Arc<dyn UserRepository>,
        Arc::clone(&queue) as Arc<dyn ActionQueue>,
    );

    let kept = engine.create_user(None).await.unwrap().user_id;
    let gone = engine.create_user(None).await.unwrap().user_id;
    engine.delete_user(gone).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 2);

    let report = engine.process_tick().await.unwrap();
    assert_eq!(report.committed, vec![kept]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures.first().map(|f| (f.user_id, f.kind, f.phase)),
        Some((gone, ErrorKind::UserNotFound, TickPhase::Pending))
    );
}

#[tokio::test]
async fn activated_features_stay_active() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 100);
    })
    .await;

    engine.transform(user, &RecipeId::from("gold_for_gem")).await.unwrap();
    let activated = engine.evaluate_features(user).await.unwrap();
    assert_eq!(activated, vec![FeatureId::from("vault")]);
    assert!(engine.evaluate_features(user).await.unwrap().is_empty());

    for _ in 0..3 {
        engine.enqueue(user).await.unwrap();
        engine.process_tick().await.unwrap();
        let active = engine.active_features(user, false).await.unwrap();
        assert_eq!(active.len(), 1);
    }
}

#[tokio::test]
async fn re_enqueue_is_a_no_op() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |_| {}).await;

    assert!(!engine.enqueue(user).await.unwrap());
    let status = engine.status().await.unwrap();
    assert_eq!(status.pending_queue_depth, 1);
}

// ---------------------------------------------------------------------------
// Queue outages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_enqueue_undoes_the_new_user() {
    let users = Arc::new(InMemoryStore::new());
    let engine = engine_over(Arc::clone(&users) as Arc<dyn UserRepository>, Arc::new(DownQueue));
    let id = UserId::new();

    let error = engine.create_user(Some(id)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::PersistenceFailure);
    assert_eq!(users.load_user(id).await.unwrap_err(), RepositoryError::NotFound(id));
    assert_eq!(engine.status().await.unwrap().active_user_count, 0);

    // The same id can be retried rather than colliding with a stranded row.
    let retry = engine.create_user(Some(id)).await.unwrap_err();
    assert_eq!(retry.kind(), ErrorKind::PersistenceFailure);
}

#[tokio::test]
async fn failed_enqueue_keeps_the_user_inactive() {
    let users = Arc::new(InMemoryStore::new());
    let mut user = UserAggregate::new(UserId::new());
    user.active = false;
    users.insert_user(&user).await.unwrap();
    let engine = engine_over(Arc::clone(&users) as Arc<dyn UserRepository>, Arc::new(DownQueue));

    let error = engine.set_active(user.user_id, true).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::PersistenceFailure);
    assert!(!engine.is_active(user.user_id).await.unwrap());
    assert!(users.list_active_user_ids().await.unwrap().is_empty());

    // Deactivating never touches the queue.
    assert!(!engine.set_active(user.user_id, false).await.unwrap());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transforms_never_overdraw() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 1_000);
    })
    .await;

    let attempts: Vec<_> = (0..25)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.transform(user, &RecipeId::from("gold_for_gem")).await })
        })
        .collect();

    let mut succeeded = 0_u32;
    let mut short = 0_u32;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => succeeded = succeeded.saturating_add(1),
            Err(error) => {
                assert_eq!(error.kind(), ErrorKind::InsufficientResources);
                short = short.saturating_add(1);
            }
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(short, 15);
    let stores = engine.stores(user).await.unwrap();
    assert_eq!(stores.get(&Store::Gold), Some(&0));
    assert_eq!(stores.get(&Store::Gem), Some(&10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tick_and_transform_on_one_user_do_not_interleave() {
    let (store, engine) = engine();
    let user = seeded_user(&store, |u| {
        u.stores.insert(Store::Gold, 100);
        u.incomes.insert(Store::Gold, rowantree_types::IncomeSource::enabled(100));
    })
    .await;

    let ticking = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.process_tick().await })
    };
    let trading = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.transform(user, &RecipeId::from("gold_for_gem")).await })
    };

    let tick = ticking.await.unwrap().unwrap();
    trading.await.unwrap().unwrap();
    assert!(tick.failures.is_empty());

    // Whatever the order, both effects landed exactly once.
    let stores = engine.stores(user).await.unwrap();
    assert_eq!(stores.get(&Store::Gold), Some(&100));
    assert_eq!(stores.get(&Store::Gem), Some(&1));
}
