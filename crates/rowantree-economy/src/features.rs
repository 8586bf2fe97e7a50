//! Feature Unlock Evaluator.
//!
//! Every inactive feature in the rule table is checked against its unlock
//! predicate. A feature whose predicate holds and whose cost is affordable
//! is activated: its cost is debited, its reward credited, its income
//! grants applied, and its state flipped to active. Evaluation repeats
//! until a pass activates nothing, so a second call without any state
//! change is always a no-op.
//!
//! Activation is monotonic. Nothing in this module clears `active`.

use chrono::{DateTime, Utc};
use rowantree_ledger::{StoreLedger, TransactionBuilder};
use rowantree_types::{
    FeatureId, FeatureState, FeatureView, IncomeSource, LedgerEntry, LedgerReason, UserAggregate,
};
use tracing::debug;

use crate::error::EconomyError;
use crate::rules::{EconomyRules, FeatureRule, UnlockPredicate};

/// The outcome of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    /// Features activated by this call, in activation order.
    pub activated: Vec<FeatureId>,
    /// Features whose predicate holds but whose cost is not yet affordable.
    pub deferred: Vec<FeatureId>,
    /// Journal lines for costs and rewards.
    pub journal: Vec<LedgerEntry>,
}

/// Whether a predicate holds for the aggregate.
pub fn holds(predicate: &UnlockPredicate, aggregate: &UserAggregate) -> bool {
    match predicate {
        UnlockPredicate::StoreAtLeast { store, amount } => aggregate.store(*store) >= *amount,
        UnlockPredicate::TierAtLeast { tier, count } => aggregate.tier_count(tier) >= *count,
        UnlockPredicate::PopulationAtLeast { count } => aggregate.total_population() >= *count,
        UnlockPredicate::FeatureActive { feature } => aggregate.feature_active(feature),
        UnlockPredicate::All { of } => of.iter().all(|nested| holds(nested, aggregate)),
        UnlockPredicate::Any { of } => of.iter().any(|nested| holds(nested, aggregate)),
    }
}

/// Activate every feature that has become unlockable.
///
/// The aggregate is only modified when the whole evaluation succeeds.
///
/// # Errors
///
/// Returns [`EconomyError::Overflow`] if a reward or income grant would
/// exceed `u64::MAX`.
pub fn evaluate(
    rules: &EconomyRules,
    aggregate: &mut UserAggregate,
    now: DateTime<Utc>,
) -> Result<Activation, EconomyError> {
    let mut staged = aggregate.clone();
    let mut activation = Activation::default();

    loop {
        let mut progressed = false;
        activation.deferred.clear();

        for rule in &rules.features {
            if staged.feature_active(&rule.id) || !holds(&rule.unlock, &staged) {
                continue;
            }
            match activate(rule, &mut staged, now)? {
                Some(journal) => {
                    activation.journal.extend(journal);
                    activation.activated.push(rule.id.clone());
                    progressed = true;
                }
                None => activation.deferred.push(rule.id.clone()),
            }
        }

        if !progressed {
            break;
        }
    }

    if !activation.activated.is_empty() {
        debug!(
            user_id = %aggregate.user_id,
            activated = activation.activated.len(),
            deferred = activation.deferred.len(),
            "Activated features"
        );
        *aggregate = staged;
    }

    Ok(activation)
}

/// Apply one feature's cost, reward, and grants. `Ok(None)` when the
/// cost is unaffordable; the aggregate is then untouched.
fn activate(
    rule: &FeatureRule,
    aggregate: &mut UserAggregate,
    now: DateTime<Utc>,
) -> Result<Option<Vec<LedgerEntry>>, EconomyError> {
    let user_id = aggregate.user_id;

    let mut incomes = aggregate.incomes.clone();
    for (store, rate) in &rule.grants_income {
        let source = incomes.entry(*store).or_insert(IncomeSource {
            rate: 0,
            enabled: true,
        });
        source.rate = source
            .rate
            .checked_add(*rate)
            .ok_or(EconomyError::Overflow("income grant"))?;
    }

    let mut stores = aggregate.stores.clone();
    let mut ledger = StoreLedger::new(user_id, &mut stores);

    let cost = rule
        .cost
        .iter()
        .filter(|(_, amount)| **amount > 0)
        .fold(
            TransactionBuilder::new(user_id, LedgerReason::FeatureCost).reference(rule.id.as_str()),
            |builder, (store, amount)| builder.debit(*store, *amount),
        );
    if rule.cost.values().any(|amount| *amount > 0) {
        match ledger.apply(&cost.build()?) {
            Ok(()) => {}
            Err(rowantree_ledger::LedgerError::Insufficient { .. }) => return Ok(None),
            Err(error) => return Err(error.into()),
        }
    }

    if rule.reward.values().any(|amount| *amount > 0) {
        let reward = rule
            .reward
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .fold(
                TransactionBuilder::new(user_id, LedgerReason::FeatureReward)
                    .reference(rule.id.as_str()),
                |builder, (store, amount)| builder.credit(*store, *amount),
            );
        ledger.apply(&reward.build()?)?;
    }

    let journal = ledger.into_journal();
    aggregate.stores = stores;
    aggregate.incomes = incomes;
    aggregate.features.insert(
        rule.id.clone(),
        FeatureState {
            active: true,
            detail: (!rule.description.is_empty()).then(|| rule.description.clone()),
            activated_at: Some(now),
        },
    );

    Ok(Some(journal))
}

/// Every feature the rule table defines, plus any stored feature the
/// table no longer mentions, with its state for this user.
pub fn feature_views(rules: &EconomyRules, aggregate: &UserAggregate, details: bool) -> Vec<FeatureView> {
    let configured = rules.features.iter().map(|rule| FeatureView {
        id: rule.id.clone(),
        active: aggregate.feature_active(&rule.id),
        description: details.then(|| rule.description.clone()),
    });

    let stored = aggregate
        .features
        .iter()
        .filter(|(id, _)| rules.feature(id).is_none())
        .map(|(id, state)| FeatureView {
            id: id.clone(),
            active: state.active,
            description: if details { state.detail.clone() } else { None },
        });

    configured.chain(stored).collect()
}

/// Only the active features.
pub fn active_features(rules: &EconomyRules, aggregate: &UserAggregate, details: bool) -> Vec<FeatureView> {
    feature_views(rules, aggregate, details)
        .into_iter()
        .filter(|view| view.active)
        .collect()
}
