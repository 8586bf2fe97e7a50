//! The per-user world tick pipeline and the tick report.
//!
//! # Phases
//!
//! ```text
//! Pending -> Accruing -> Evaluating -> Growing -> Committing -> Committed
//!                  \___________\___________\___________\______> Failed(reason)
//! ```
//!
//! [`advance`] runs the three computing phases on a copy of the user's
//! aggregate and reconciles the combined journal against the opening
//! balances. The caller commits the copy only when every phase succeeds,
//! so a failed user keeps its pre-tick state.

use chrono::{DateTime, Utc};
use rowantree_economy::{EconomyRules, features, income, population};
use rowantree_ledger::{ReconcileResult, reconcile};
use rowantree_types::{FeatureId, LedgerEntry, UserAggregate, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, ErrorKind};

/// Where a user is within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    /// Dequeued, not yet loaded.
    Pending,
    /// Applying income.
    Accruing,
    /// Evaluating feature unlocks.
    Evaluating,
    /// Applying tier growth and reconciling.
    Growing,
    /// Saving the next state.
    Committing,
    /// The next state has been saved.
    Committed,
}

impl TickPhase {
    /// Lowercase phase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accruing => "accruing",
            Self::Evaluating => "evaluating",
            Self::Growing => "growing",
            Self::Committing => "committing",
            Self::Committed => "committed",
        }
    }
}

impl core::fmt::Display for TickPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's failure within a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTickFailure {
    /// The user that failed.
    pub user_id: UserId,
    /// The phase in progress when the failure occurred.
    pub phase: TickPhase,
    /// Stable classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub reason: String,
}

impl UserTickFailure {
    /// Build a failure record from an engine error.
    pub fn new(user_id: UserId, phase: TickPhase, error: &EngineError) -> Self {
        Self {
            user_id,
            phase,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// What happened to one dequeued user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserTickOutcome {
    /// The tick was applied. `changed` is false when nothing moved and the
    /// save was skipped.
    Committed {
        /// Whether any state changed.
        changed: bool,
    },
    /// The user is inactive and was not ticked.
    Skipped,
    /// The user's tick was rolled back.
    Failed(UserTickFailure),
}

/// Summary of one world tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Monotonic tick number within this process, starting at 1.
    pub tick: u64,
    /// When the queue was drained.
    pub started_at: DateTime<Utc>,
    /// When the last user finished.
    pub finished_at: DateTime<Utc>,
    /// Entries taken from the queue.
    pub dequeued: u64,
    /// Users whose tick committed, in id order.
    pub committed: Vec<UserId>,
    /// Inactive users passed over, in id order.
    pub skipped: Vec<UserId>,
    /// Users whose tick failed, in id order.
    pub failures: Vec<UserTickFailure>,
}

/// The computed next state of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickStep {
    /// The aggregate after income, features, and growth.
    pub next: UserAggregate,
    /// Every journal line the three phases produced.
    pub journal: Vec<LedgerEntry>,
    /// Features activated this tick.
    pub activated: Vec<FeatureId>,
}

impl TickStep {
    /// Whether the tick changed anything relative to `before`.
    pub fn changed(&self, before: &UserAggregate) -> bool {
        !self.journal.is_empty() || self.next != *before
    }
}

/// Run income, feature evaluation, and growth for one user.
///
/// `snapshot` is never modified. On failure the phase that failed is
/// returned with the error.
pub fn advance(
    rules: &EconomyRules,
    snapshot: &UserAggregate,
    now: DateTime<Utc>,
) -> Result<TickStep, (TickPhase, EngineError)> {
    let mut next = snapshot.clone();
    let mut journal = Vec::new();

    let accrual = income::accrue(rules, &mut next)
        .map_err(|error| (TickPhase::Accruing, EngineError::from(error)))?;
    journal.extend(accrual.journal);

    let activation = features::evaluate(rules, &mut next, now)
        .map_err(|error| (TickPhase::Evaluating, EngineError::from(error)))?;
    journal.extend(activation.journal);

    let growth = population::grow(rules, &mut next)
        .map_err(|error| (TickPhase::Growing, EngineError::from(error)))?;
    journal.extend(growth.journal);

    if let ReconcileResult::Anomaly(anomaly) =
        reconcile(snapshot.user_id, &snapshot.stores, &next.stores, &journal)
    {
        return Err((TickPhase::Growing, EngineError::Anomaly(anomaly)));
    }

    debug!(
        user_id = %snapshot.user_id,
        journal_lines = journal.len(),
        activated = activation.activated.len(),
        "Computed user tick"
    );

    Ok(TickStep {
        next,
        journal,
        activated: activation.activated,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use rowantree_economy::TierRule;
    use rowantree_types::{IncomeSource, Store, TierId};

    fn bare_rules() -> EconomyRules {
        EconomyRules {
            tiers: vec![TierRule {
                id: TierId::from("a"),
                income_bonus_pct: 0,
            }],
            routes: Vec::new(),
            growth: Vec::new(),
            features: Vec::new(),
            merchants: Vec::new(),
            ..EconomyRules::default()
        }
    }

    #[test]
    fn income_scenario() {
        let mut user = UserAggregate::new(UserId::new());
        user.stores.insert(Store::Gold, 5);
        user.incomes.insert(Store::Gold, IncomeSource::enabled(10));

        let step = advance(&bare_rules(), &user, Utc::now());
        assert!(step.is_ok());
        if let Ok(step) = step {
            assert_eq!(step.next.store(Store::Gold), 15);
            assert!(step.changed(&user));
        }
        // The snapshot is untouched.
        assert_eq!(user.store(Store::Gold), 5);
    }

    #[test]
    fn idle_user_is_unchanged() {
        let mut user = UserAggregate::new(UserId::new());
        user.stores = BTreeMap::from([(Store::Wood, 3)]);

        let step = advance(&EconomyRules::default(), &user, Utc::now());
        assert!(step.is_ok());
        if let Ok(step) = step {
            assert!(!step.changed(&user));
            assert_eq!(step.next, user);
        }
    }

    #[test]
    fn overflow_fails_in_accruing_phase() {
        let mut user = UserAggregate::new(UserId::new());
        user.stores.insert(Store::Gold, u64::MAX);
        user.incomes.insert(Store::Gold, IncomeSource::enabled(1));

        let result = advance(&bare_rules(), &user, Utc::now());
        assert!(matches!(result, Err((TickPhase::Accruing, _))));
        if let Err((_, error)) = result {
            assert_eq!(error.kind(), ErrorKind::Internal);
        }
    }
}
