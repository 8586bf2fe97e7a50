//! Population Tier Model: transport between adjacent tiers and per-tick
//! tier growth.
//!
//! Transport is a pure transfer. The head count leaving `from` equals the
//! head count arriving at `to`, and any route cost is charged in the same
//! step. Growth is the only source of new population: it converts stores
//! into heads at a configured threshold.

use std::collections::BTreeMap;

use rowantree_ledger::{StoreLedger, TransactionBuilder};
use rowantree_types::{LedgerEntry, LedgerReason, TierId, UserAggregate};
use tracing::debug;

use crate::error::EconomyError;
use crate::rules::EconomyRules;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The outcome of a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
    /// Population per tier after the move.
    pub population: BTreeMap<TierId, u64>,
    /// Journal lines for the route cost, if any.
    pub journal: Vec<LedgerEntry>,
}

/// Move `count` heads from one tier to an adjacent tier.
///
/// # Errors
///
/// - [`EconomyError::InvalidQuantity`] if `count` is zero.
/// - [`EconomyError::InvalidTier`] if either tier is unknown or the tiers
///   are not adjacent.
/// - [`EconomyError::InsufficientPopulation`] if `from` holds fewer than
///   `count` heads.
/// - [`EconomyError::InsufficientResources`] if the route cost is short.
///
/// The aggregate is unchanged on every error.
pub fn transport(
    rules: &EconomyRules,
    aggregate: &mut UserAggregate,
    from: &TierId,
    to: &TierId,
    count: u64,
) -> Result<Transport, EconomyError> {
    if count == 0 {
        return Err(EconomyError::InvalidQuantity("transport count must be positive"));
    }

    let invalid = |reason: &'static str| EconomyError::InvalidTier {
        from: from.clone(),
        to: to.clone(),
        reason,
    };
    if rules.tier(from).is_none() || rules.tier(to).is_none() {
        return Err(invalid("unknown tier"));
    }
    if from == to {
        return Err(invalid("source and destination are the same tier"));
    }
    let route = rules.route(from, to).ok_or_else(|| invalid("tiers are not adjacent"))?;

    let available = aggregate.tier_count(from);
    let remaining = available
        .checked_sub(count)
        .ok_or_else(|| EconomyError::InsufficientPopulation {
            tier: from.clone(),
            requested: count,
            available,
        })?;
    let arrived = aggregate
        .tier_count(to)
        .checked_add(count)
        .ok_or(EconomyError::Overflow("tier population"))?;

    let user_id = aggregate.user_id;
    let mut charges = Vec::new();
    for (store, per_head) in &route.cost {
        let total = per_head
            .checked_mul(count)
            .ok_or(EconomyError::Overflow("transport cost"))?;
        if total > 0 {
            charges.push((*store, total));
        }
    }

    let journal = if charges.is_empty() {
        Vec::new()
    } else {
        let transaction = charges
            .iter()
            .fold(
                TransactionBuilder::new(user_id, LedgerReason::TransportCost)
                    .reference(format!("{from}->{to}")),
                |builder, (store, total)| builder.debit(*store, *total),
            )
            .build()?;
        let mut ledger = StoreLedger::new(user_id, &mut aggregate.stores);
        ledger.apply(&transaction)?;
        ledger.into_journal()
    };

    // Ledger has committed; the population move cannot fail from here.
    aggregate.population.insert(from.clone(), remaining);
    aggregate.population.insert(to.clone(), arrived);

    debug!(
        user_id = %user_id,
        from = %from,
        to = %to,
        count,
        "Transported population"
    );

    Ok(Transport {
        population: aggregate.population.clone(),
        journal,
    })
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

/// The outcome of one growth step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Growth {
    /// Heads added per tier.
    pub grown: BTreeMap<TierId, u64>,
    /// Journal lines for the consumed stores.
    pub journal: Vec<LedgerEntry>,
}

/// Apply every growth rule once, in configuration order.
///
/// For each rule, `batches = min(store / threshold, max_per_tick)`;
/// `batches * threshold` is consumed and `batches * growth` heads join
/// the tier. Rules gated on an inactive feature are skipped.
///
/// # Errors
///
/// Returns [`EconomyError::Overflow`] if a tier count would exceed
/// `u64::MAX`; the aggregate is unchanged in that case.
pub fn grow(rules: &EconomyRules, aggregate: &mut UserAggregate) -> Result<Growth, EconomyError> {
    let mut staged = aggregate.clone();
    let mut growth = Growth::default();
    let user_id = staged.user_id;

    for rule in &rules.growth {
        if rule
            .requires_feature
            .as_ref()
            .is_some_and(|feature| !staged.feature_active(feature))
        {
            continue;
        }

        let possible = staged
            .store(rule.store)
            .checked_div(rule.threshold)
            .unwrap_or(0);
        let batches = rule
            .max_per_tick
            .map_or(possible, |limit| possible.min(limit));
        if batches == 0 {
            continue;
        }

        let consumed = batches
            .checked_mul(rule.threshold)
            .ok_or(EconomyError::Overflow("growth consumption"))?;
        let heads = batches
            .checked_mul(rule.growth)
            .ok_or(EconomyError::Overflow("growth heads"))?;
        let next = staged
            .tier_count(&rule.tier)
            .checked_add(heads)
            .ok_or(EconomyError::Overflow("tier population"))?;

        let transaction = TransactionBuilder::new(user_id, LedgerReason::TierGrowth)
            .debit(rule.store, consumed)
            .reference(rule.tier.as_str())
            .build()?;
        let mut ledger = StoreLedger::new(user_id, &mut staged.stores);
        ledger.apply(&transaction)?;
        growth.journal.extend(ledger.into_journal());

        staged.population.insert(rule.tier.clone(), next);
        let total = growth.grown.entry(rule.tier.clone()).or_insert(0);
        *total = total
            .checked_add(heads)
            .ok_or(EconomyError::Overflow("tier population"))?;
    }

    if !growth.grown.is_empty() {
        debug!(user_id = %user_id, tiers = growth.grown.len(), "Population grew");
        *aggregate = staged;
    }

    Ok(growth)
}
