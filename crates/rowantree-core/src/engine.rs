//! The [`EconomyEngine`]: every user-facing and operator operation.
//!
//! # Unit of work
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Acquire the user's lock from [`UserLocks`].
//! 2. Load the aggregate through the [`UserRepository`].
//! 3. Compute the next state on the loaded copy with `rowantree-economy`.
//! 4. Reconcile the journal against the opening balances.
//! 5. Save the aggregate and journal in one repository call.
//!
//! A failure at any step returns before the save, so persisted state is
//! never half-updated. The engine holds no user state between operations;
//! its only in-memory state is the tick counter.
//!
//! # World tick
//!
//! [`EconomyEngine::process_tick`] drains the [`ActionQueue`] and runs the
//! per-user pipeline from [`crate::tick`] for up to `concurrency` users at
//! a time. Each user is processed under its own lock, so a tick never
//! interleaves with a transform or transport on the same user.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rowantree_economy::{EconomyRules, features, income, merchant, population};
use rowantree_ledger::{ReconcileResult, delta, reconcile};
use rowantree_types::{
    FeatureId, FeatureState, FeatureView, IncomeSource, LedgerDelta, LedgerEntry, MerchantView,
    RecipeId, Store, TierId, UserAggregate, UserId, UserState, WorldStatus,
};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::locks::UserLocks;
use crate::repository::{ActionQueue, UserRepository};
use crate::tick::{self, TickPhase, TickReport, UserTickFailure, UserTickOutcome};

/// Default number of users ticked in parallel.
pub const DEFAULT_TICK_CONCURRENCY: usize = 16;

/// The economy state-transition engine.
///
/// Constructed once at startup with its persistence adapters and the rule
/// table, then shared behind an `Arc`.
pub struct EconomyEngine {
    users: Arc<dyn UserRepository>,
    queue: Arc<dyn ActionQueue>,
    rules: Arc<EconomyRules>,
    locks: UserLocks,
    tick_counter: AtomicU64,
    concurrency: usize,
}

impl core::fmt::Debug for EconomyEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EconomyEngine")
            .field("locks", &self.locks.len())
            .field("tick", &self.tick_counter.load(Ordering::Acquire))
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl EconomyEngine {
    /// Create an engine over the given adapters and rules.
    pub fn new(
        users: Arc<dyn UserRepository>,
        queue: Arc<dyn ActionQueue>,
        rules: Arc<EconomyRules>,
    ) -> Self {
        Self {
            users,
            queue,
            rules,
            locks: UserLocks::new(),
            tick_counter: AtomicU64::new(0),
            concurrency: DEFAULT_TICK_CONCURRENCY,
        }
    }

    /// Set how many users a tick processes in parallel (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The rule table the engine was built with.
    pub fn rules(&self) -> &EconomyRules {
        &self.rules
    }

    /// Ticks completed by this process.
    pub fn ticks(&self) -> u64 {
        self.tick_counter.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Unit of work
    // -----------------------------------------------------------------------

    async fn read<T>(
        &self,
        user_id: UserId,
        view: impl FnOnce(&UserAggregate) -> T,
    ) -> Result<T, EngineError> {
        let aggregate = self.users.load_user(user_id).await?;
        Ok(view(&aggregate))
    }

    /// Lock, load, compute, reconcile, save. `compute` returns its result
    /// and the journal lines it produced. Nothing is saved when the
    /// aggregate is unchanged.
    async fn mutate<T>(
        &self,
        user_id: UserId,
        compute: impl FnOnce(&EconomyRules, &mut UserAggregate) -> Result<(T, Vec<LedgerEntry>), EngineError>,
    ) -> Result<T, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        self.mutate_locked(user_id, compute).await
    }

    /// [`Self::mutate`] for a caller that already holds the user's lock.
    async fn mutate_locked<T>(
        &self,
        user_id: UserId,
        compute: impl FnOnce(&EconomyRules, &mut UserAggregate) -> Result<(T, Vec<LedgerEntry>), EngineError>,
    ) -> Result<T, EngineError> {
        let before = self.users.load_user(user_id).await?;
        let mut next = before.clone();
        let (output, journal) = compute(self.rules.as_ref(), &mut next)?;

        if let ReconcileResult::Anomaly(anomaly) =
            reconcile(user_id, &before.stores, &next.stores, &journal)
        {
            warn!(user_id = %user_id, "{anomaly}");
            return Err(EngineError::Anomaly(anomaly));
        }

        if journal.is_empty() && next == before {
            return Ok(output);
        }

        let version = self.users.save_user(&next, &journal).await?;
        debug!(
            user_id = %user_id,
            version,
            journal_lines = journal.len(),
            "Saved user aggregate"
        );
        Ok(output)
    }

    /// Set the active flag with the lock held. Returns the previous flag.
    async fn store_active_locked(
        &self,
        user_id: UserId,
        active: bool,
    ) -> Result<bool, EngineError> {
        self.mutate_locked(user_id, |_, user| {
            let previous = user.active;
            user.active = active;
            Ok((previous, Vec::new()))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // User lifecycle
    // -----------------------------------------------------------------------

    /// Create a user from the configured starting state.
    ///
    /// A fresh v7 id is generated when `user_id` is `None`. Active users
    /// are queued for the next tick.
    pub async fn create_user(&self, user_id: Option<UserId>) -> Result<UserState, EngineError> {
        let user_id = user_id.unwrap_or_default();
        let starting = &self.rules.starting;

        let mut aggregate = UserAggregate::new(user_id);
        aggregate.active = starting.active;
        aggregate.stores = Store::ALL.iter().map(|store| (*store, 0)).collect();
        aggregate.stores.extend(starting.stores.iter().map(|(s, q)| (*s, *q)));
        aggregate.incomes = starting
            .incomes
            .iter()
            .map(|(store, rate)| (*store, IncomeSource::enabled(*rate)))
            .collect();
        aggregate.features = self
            .rules
            .features
            .iter()
            .map(|rule| (rule.id.clone(), FeatureState::default()))
            .collect();
        aggregate.population = self.rules.tiers.iter().map(|tier| (tier.id.clone(), 0)).collect();
        aggregate
            .population
            .extend(starting.population.iter().map(|(t, c)| (t.clone(), *c)));

        let guard = self.locks.lock(user_id).await;
        self.users.insert_user(&aggregate).await?;
        if aggregate.active {
            // Undo the insert so the same id can be retried.
            if let Err(error) = self.queue.enqueue(user_id).await {
                warn!(user_id = %user_id, %error, "Enqueue failed, removing new user");
                if let Err(cleanup) = self.users.delete_user(user_id).await {
                    warn!(user_id = %user_id, error = %cleanup, "Failed to remove new user");
                }
                return Err(EngineError::from(error));
            }
        }
        drop(guard);

        info!(user_id = %user_id, active = aggregate.active, "User created");
        Ok(self.state_of(&aggregate))
    }

    /// Delete a user and everything it owns.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), EngineError> {
        let _guard = self.locks.lock(user_id).await;
        self.users.delete_user(user_id).await?;
        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Whether the user takes part in world ticks.
    pub async fn is_active(&self, user_id: UserId) -> Result<bool, EngineError> {
        self.read(user_id, |user| user.active).await
    }

    /// Set the active flag. Activating also queues the user; if that
    /// fails the previous flag is restored.
    pub async fn set_active(&self, user_id: UserId, active: bool) -> Result<bool, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        let previous = self.store_active_locked(user_id, active).await?;
        if !active {
            return Ok(active);
        }
        if let Err(error) = self.queue.enqueue(user_id).await {
            warn!(user_id = %user_id, %error, "Enqueue failed, restoring active flag");
            if let Err(restore) = self.store_active_locked(user_id, previous).await {
                warn!(user_id = %user_id, error = %restore, "Failed to restore active flag");
            }
            return Err(EngineError::from(error));
        }
        Ok(active)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Store quantities.
    pub async fn stores(&self, user_id: UserId) -> Result<BTreeMap<Store, u64>, EngineError> {
        self.read(user_id, |user| user.stores.clone()).await
    }

    /// Income sources.
    pub async fn incomes(
        &self,
        user_id: UserId,
    ) -> Result<BTreeMap<Store, IncomeSource>, EngineError> {
        self.read(user_id, |user| user.incomes.clone()).await
    }

    /// Every feature with its state.
    pub async fn features(
        &self,
        user_id: UserId,
        details: bool,
    ) -> Result<Vec<FeatureView>, EngineError> {
        self.read(user_id, |user| features::feature_views(&self.rules, user, details))
            .await
    }

    /// Only active features.
    pub async fn active_features(
        &self,
        user_id: UserId,
        details: bool,
    ) -> Result<Vec<FeatureView>, EngineError> {
        self.read(user_id, |user| features::active_features(&self.rules, user, details))
            .await
    }

    /// Merchant recipes the user may perform.
    pub async fn merchants(&self, user_id: UserId) -> Result<Vec<MerchantView>, EngineError> {
        self.read(user_id, |user| merchant::merchant_views(&self.rules, user))
            .await
    }

    /// Population per tier.
    pub async fn population(&self, user_id: UserId) -> Result<BTreeMap<TierId, u64>, EngineError> {
        self.read(user_id, |user| user.population.clone()).await
    }

    /// The full read model.
    pub async fn user_state(&self, user_id: UserId) -> Result<UserState, EngineError> {
        self.read(user_id, |user| self.state_of(user)).await
    }

    fn state_of(&self, user: &UserAggregate) -> UserState {
        UserState {
            user_id: user.user_id,
            active: user.active,
            stores: user.stores.clone(),
            incomes: user.incomes.clone(),
            features: features::feature_views(&self.rules, user, true),
            population: user.population.clone(),
            merchants: merchant::merchant_views(&self.rules, user),
        }
    }

    // -----------------------------------------------------------------------
    // Economy operations
    // -----------------------------------------------------------------------

    /// Create or update an income source.
    pub async fn set_income(
        &self,
        user_id: UserId,
        store: Store,
        rate: u64,
        enabled: bool,
    ) -> Result<IncomeSource, EngineError> {
        self.mutate(user_id, |_, user| {
            let source = IncomeSource { rate, enabled };
            user.incomes.insert(store, source);
            Ok((source, Vec::new()))
        })
        .await
    }

    /// Apply one round of income outside the tick.
    pub async fn accrue_income(&self, user_id: UserId) -> Result<BTreeMap<Store, u64>, EngineError> {
        self.mutate(user_id, |rules, user| {
            let accrual = income::accrue(rules, user)?;
            Ok((accrual.added, accrual.journal))
        })
        .await
    }

    /// Activate every feature that has become unlockable.
    pub async fn evaluate_features(&self, user_id: UserId) -> Result<Vec<FeatureId>, EngineError> {
        self.mutate(user_id, |rules, user| {
            let activation = features::evaluate(rules, user, Utc::now())?;
            Ok((activation.activated, activation.journal))
        })
        .await
    }

    /// Perform a merchant transform.
    pub async fn transform(
        &self,
        user_id: UserId,
        recipe: &RecipeId,
    ) -> Result<LedgerDelta, EngineError> {
        let result = self
            .mutate(user_id, |rules, user| {
                let journal = merchant::transform(rules, user, recipe)?;
                let summary = delta(journal.clone()).map_err(rowantree_economy::EconomyError::from)?;
                Ok((summary, journal))
            })
            .await;

        match &result {
            Ok(_) => info!(user_id = %user_id, recipe = %recipe, "Merchant transform"),
            Err(error) => warn!(user_id = %user_id, recipe = %recipe, kind = %error.kind(), "Merchant transform rejected"),
        }
        result
    }

    /// Move population between adjacent tiers.
    pub async fn transport(
        &self,
        user_id: UserId,
        from: &TierId,
        to: &TierId,
        count: u64,
    ) -> Result<BTreeMap<TierId, u64>, EngineError> {
        let result = self
            .mutate(user_id, |rules, user| {
                let moved = population::transport(rules, user, from, to, count)?;
                Ok((moved.population, moved.journal))
            })
            .await;

        match &result {
            Ok(_) => info!(user_id = %user_id, from = %from, to = %to, count, "Transport"),
            Err(error) => warn!(user_id = %user_id, from = %from, to = %to, count, kind = %error.kind(), "Transport rejected"),
        }
        result
    }

    // -----------------------------------------------------------------------
    // Action queue
    // -----------------------------------------------------------------------

    /// Queue an existing user for the next tick. Returns `false` when the
    /// user was already pending.
    pub async fn enqueue(&self, user_id: UserId) -> Result<bool, EngineError> {
        self.users.load_user(user_id).await?;
        Ok(self.queue.enqueue(user_id).await?)
    }

    /// Queue several existing users. Every id is checked before any is
    /// queued, so an unknown id leaves the queue untouched. Returns how
    /// many were newly queued.
    pub async fn enqueue_users(&self, user_ids: &[UserId]) -> Result<u64, EngineError> {
        for user_id in user_ids {
            self.users.load_user(*user_id).await?;
        }
        let mut queued: u64 = 0;
        for user_id in user_ids {
            if self.queue.enqueue(*user_id).await? {
                queued = queued.saturating_add(1);
            }
        }
        Ok(queued)
    }

    /// Queue every active user. Returns how many were newly queued.
    pub async fn enqueue_active_users(&self) -> Result<u64, EngineError> {
        let mut queued: u64 = 0;
        for user_id in self.users.list_active_user_ids().await? {
            if self.queue.enqueue(user_id).await? {
                queued = queued.saturating_add(1);
            }
        }
        debug!(queued, "Enqueued active users");
        Ok(queued)
    }

    /// Run one world tick over every queued user.
    ///
    /// Per-user failures are collected in the report and never abort the
    /// tick. Only a failure to drain the queue is returned as an error.
    pub async fn process_tick(&self) -> Result<TickReport, EngineError> {
        let started_at = Utc::now();
        let entries = self.queue.dequeue_all().await?;
        let tick = self
            .tick_counter
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        let dequeued = u64::try_from(entries.len()).unwrap_or(u64::MAX);
        let mut outcomes: Vec<(UserId, UserTickOutcome)> = stream::iter(entries)
            .map(|entry| async move { (entry.user_id, self.tick_user(entry.user_id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(user_id, _)| *user_id);

        let mut report = TickReport {
            tick,
            started_at,
            dequeued,
            ..TickReport::default()
        };
        for (user_id, outcome) in outcomes {
            match outcome {
                UserTickOutcome::Committed { .. } => report.committed.push(user_id),
                UserTickOutcome::Skipped => report.skipped.push(user_id),
                UserTickOutcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report.finished_at = Utc::now();

        info!(
            tick,
            dequeued,
            committed = report.committed.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "World tick complete"
        );
        Ok(report)
    }

    /// One user's pass through the tick state machine.
    async fn tick_user(&self, user_id: UserId) -> UserTickOutcome {
        let _guard = self.locks.lock(user_id).await;

        let fail = |phase: TickPhase, error: &EngineError| {
            let failure = UserTickFailure::new(user_id, phase, error);
            warn!(
                user_id = %user_id,
                phase = %phase,
                kind = %failure.kind,
                reason = %failure.reason,
                "User tick failed"
            );
            UserTickOutcome::Failed(failure)
        };

        let snapshot = match self.users.load_user(user_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => return fail(TickPhase::Pending, &EngineError::from(error)),
        };
        if !snapshot.active {
            debug!(user_id = %user_id, "Skipping inactive user");
            return UserTickOutcome::Skipped;
        }

        let step = match tick::advance(&self.rules, &snapshot, Utc::now()) {
            Ok(step) => step,
            Err((phase, error)) => return fail(phase, &error),
        };

        if !step.changed(&snapshot) {
            return UserTickOutcome::Committed { changed: false };
        }

        match self.users.save_user(&step.next, &step.journal).await {
            Ok(version) => {
                debug!(
                    user_id = %user_id,
                    version,
                    phase = %TickPhase::Committed,
                    activated = step.activated.len(),
                    "User tick committed"
                );
                UserTickOutcome::Committed { changed: true }
            }
            Err(error) => fail(TickPhase::Committing, &EngineError::from(error)),
        }
    }

    // -----------------------------------------------------------------------
    // World status
    // -----------------------------------------------------------------------

    /// Active user count, their population, and the queue depth.
    pub async fn status(&self) -> Result<WorldStatus, EngineError> {
        let totals = self.users.world_totals().await?;
        let pending_queue_depth = self.queue.depth().await?;
        Ok(WorldStatus {
            active_user_count: totals.active_user_count,
            total_population: totals.total_population,
            pending_queue_depth,
        })
    }
}
