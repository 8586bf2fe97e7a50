//! Journal summaries and balance reconciliation.
//!
//! The world tick computes a user's next state on a copy of the aggregate.
//! Before the copy is committed, [`reconcile`] checks that the difference
//! between the old and new balances is exactly what the journal says
//! happened. Well-formed transactions balance by construction; the check
//! guards the tick pipeline against code paths that touch the store map
//! directly.

use std::collections::{BTreeMap, BTreeSet};

use rowantree_types::{EntryDirection, LedgerDelta, LedgerEntry, Store, StoreFlow, UserId};

use crate::{LedgerAnomaly, LedgerError};

/// The result of reconciling one user's balances against their journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Every store matches its journal.
    Balanced,
    /// One or more stores disagree with the journal.
    Anomaly(LedgerAnomaly),
}

/// Total credited and debited quantity per store.
///
/// # Errors
///
/// Returns [`LedgerError::Overflow`] if a total exceeds `u64::MAX`.
pub fn summarize(entries: &[LedgerEntry]) -> Result<BTreeMap<Store, StoreFlow>, LedgerError> {
    let mut flows: BTreeMap<Store, StoreFlow> = BTreeMap::new();

    for entry in entries {
        let flow = flows.entry(entry.store).or_default();
        let total = match entry.direction {
            EntryDirection::Credit => &mut flow.credited,
            EntryDirection::Debit => &mut flow.debited,
        };
        *total = total
            .checked_add(entry.quantity)
            .ok_or(LedgerError::Overflow { store: entry.store })?;
    }

    Ok(flows)
}

/// Package a journal as the [`LedgerDelta`] returned to callers.
///
/// # Errors
///
/// Returns [`LedgerError::Overflow`] if a per-store total overflows.
pub fn delta(entries: Vec<LedgerEntry>) -> Result<LedgerDelta, LedgerError> {
    let flows = summarize(&entries)?;
    Ok(LedgerDelta { flows, entries })
}

/// Verify `after == before + credits - debits` for every store.
///
/// Stores absent from a map read as zero, so a store that first appears
/// in `after` must be fully explained by credits.
pub fn reconcile(
    user_id: UserId,
    before: &BTreeMap<Store, u64>,
    after: &BTreeMap<Store, u64>,
    journal: &[LedgerEntry],
) -> ReconcileResult {
    let flows = match summarize(journal) {
        Ok(flows) => flows,
        Err(LedgerError::Overflow { store }) => {
            return anomaly(
                user_id,
                BTreeMap::from([(store, (None, after.get(&store).copied().unwrap_or(0)))]),
            );
        }
        Err(_) => BTreeMap::new(),
    };

    let stores: BTreeSet<Store> = before
        .keys()
        .chain(after.keys())
        .chain(flows.keys())
        .copied()
        .collect();

    let mut mismatches = BTreeMap::new();
    for store in stores {
        let opening = before.get(&store).copied().unwrap_or(0);
        let closing = after.get(&store).copied().unwrap_or(0);
        let flow = flows.get(&store).copied().unwrap_or_default();

        let expected = opening
            .checked_add(flow.credited)
            .and_then(|raised| raised.checked_sub(flow.debited));

        if expected != Some(closing) {
            mismatches.insert(store, (expected, closing));
        }
    }

    if mismatches.is_empty() {
        ReconcileResult::Balanced
    } else {
        anomaly(user_id, mismatches)
    }
}

fn anomaly(user_id: UserId, mismatches: BTreeMap<Store, (Option<u64>, u64)>) -> ReconcileResult {
    let count = mismatches.len();
    ReconcileResult::Anomaly(LedgerAnomaly {
        user_id,
        mismatches,
        message: format!("LEDGER_ANOMALY for user {user_id}: {count} store(s) do not match the journal"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionBuilder;
    use rowantree_types::LedgerReason;

    fn journal_for(
        user: UserId,
        stores: &mut BTreeMap<Store, u64>,
        build: impl FnOnce(TransactionBuilder) -> TransactionBuilder,
    ) -> Vec<LedgerEntry> {
        let tx = build(TransactionBuilder::new(user, LedgerReason::Income)).build();
        tx.and_then(|tx| tx.apply_to(stores)).unwrap_or_default()
    }

    #[test]
    fn applied_transactions_reconcile() {
        let user = UserId::new();
        let before = BTreeMap::from([(Store::Gold, 5), (Store::Wood, 1)]);
        let mut after = before.clone();
        let journal = journal_for(user, &mut after, |b| {
            b.credit(Store::Gold, 10).debit(Store::Wood, 1).credit(Store::Gem, 2)
        });

        assert_eq!(journal.len(), 3);
        assert_eq!(reconcile(user, &before, &after, &journal), ReconcileResult::Balanced);
    }

    #[test]
    fn unjournaled_change_is_an_anomaly() {
        let user = UserId::new();
        let before = BTreeMap::from([(Store::Gold, 5)]);
        let after = BTreeMap::from([(Store::Gold, 6)]);

        let result = reconcile(user, &before, &after, &[]);
        assert!(matches!(result, ReconcileResult::Anomaly(_)));
        if let ReconcileResult::Anomaly(anomaly) = result {
            assert_eq!(anomaly.user_id, user);
            assert_eq!(anomaly.mismatches.get(&Store::Gold), Some(&(Some(5), 6)));
            assert!(anomaly.message.contains("LEDGER_ANOMALY"));
        }
    }

    #[test]
    fn summarize_totals_each_direction() {
        let user = UserId::new();
        let mut stores = BTreeMap::from([(Store::Food, 20)]);
        let journal = journal_for(user, &mut stores, |b| {
            b.credit(Store::Food, 3).credit(Store::Food, 4).debit(Store::Food, 5)
        });

        let flows = summarize(&journal).unwrap_or_default();
        assert_eq!(
            flows.get(&Store::Food),
            Some(&StoreFlow {
                credited: 7,
                debited: 5,
            })
        );

        let packaged = delta(journal).unwrap_or_default();
        assert_eq!(packaged.entries.len(), 3);
        assert_eq!(packaged.flows, flows);
    }
}
