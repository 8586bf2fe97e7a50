//! The [`StoreLedger`]: one user's stores plus the journal of everything
//! applied to them during a unit of work.

use std::collections::BTreeMap;

use rowantree_types::{EntryDirection, LedgerEntry, LedgerReason, Store, UserId};
use tracing::debug;

use crate::LedgerError;
use crate::transaction::{LedgerTransaction, TransactionBuilder};

/// Mutable view over one user's stores that records every applied line.
///
/// The ledger borrows the store map rather than owning it so that callers
/// can mutate the rest of the user aggregate (population, features) in the
/// same unit of work.
#[derive(Debug)]
pub struct StoreLedger<'a> {
    user_id: UserId,
    stores: &'a mut BTreeMap<Store, u64>,
    journal: Vec<LedgerEntry>,
}

impl<'a> StoreLedger<'a> {
    /// Open a ledger over `stores` with an empty journal.
    pub const fn new(user_id: UserId, stores: &'a mut BTreeMap<Store, u64>) -> Self {
        Self {
            user_id,
            stores,
            journal: Vec::new(),
        }
    }

    /// Quantity held in a store (zero when absent).
    pub fn get(&self, store: Store) -> u64 {
        self.stores.get(&store).copied().unwrap_or(0)
    }

    /// Apply a single signed movement and return the new quantity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroQuantity`] for a zero movement,
    /// [`LedgerError::Insufficient`] if a debit exceeds the balance, or
    /// [`LedgerError::Overflow`] if a credit exceeds `u64::MAX`. The store
    /// is unchanged on error.
    pub fn adjust(
        &mut self,
        store: Store,
        direction: EntryDirection,
        quantity: u64,
        reason: LedgerReason,
    ) -> Result<u64, LedgerError> {
        let builder = TransactionBuilder::new(self.user_id, reason);
        let builder = match direction {
            EntryDirection::Credit => builder.credit(store, quantity),
            EntryDirection::Debit => builder.debit(store, quantity),
        };
        self.apply(&builder.build()?)?;
        Ok(self.get(store))
    }

    /// Apply a whole transaction, or nothing.
    ///
    /// # Errors
    ///
    /// Propagates the transaction's validation failure; the stores and the
    /// journal are unchanged on error.
    pub fn apply(&mut self, transaction: &LedgerTransaction) -> Result<(), LedgerError> {
        let entries = transaction.apply_to(self.stores)?;
        debug!(
            user_id = %self.user_id,
            lines = entries.len(),
            "Applied ledger transaction"
        );
        self.journal.extend(entries);
        Ok(())
    }

    /// Journal lines applied so far.
    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    /// Close the ledger and hand back its journal.
    pub fn into_journal(self) -> Vec<LedgerEntry> {
        self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_credits_and_debits() {
        let user = UserId::new();
        let mut stores = BTreeMap::new();
        let mut ledger = StoreLedger::new(user, &mut stores);

        let after_credit = ledger.adjust(Store::Wood, EntryDirection::Credit, 12, LedgerReason::Income);
        assert_eq!(after_credit.ok(), Some(12));

        let after_debit =
            ledger.adjust(Store::Wood, EntryDirection::Debit, 5, LedgerReason::FeatureCost);
        assert_eq!(after_debit.ok(), Some(7));

        assert_eq!(ledger.journal().len(), 2);
        let journal = ledger.into_journal();
        assert!(journal.iter().all(|entry| entry.user_id == user));
        assert_eq!(stores.get(&Store::Wood), Some(&7));
    }

    #[test]
    fn overdraw_is_rejected_and_not_journaled() {
        let mut stores = BTreeMap::from([(Store::Meat, 3)]);
        let mut ledger = StoreLedger::new(UserId::new(), &mut stores);

        let result = ledger.adjust(Store::Meat, EntryDirection::Debit, 4, LedgerReason::TierGrowth);
        assert_eq!(
            result.err(),
            Some(LedgerError::Insufficient {
                store: Store::Meat,
                requested: 4,
                available: 3,
            })
        );
        assert!(ledger.journal().is_empty());
        assert_eq!(ledger.get(Store::Meat), 3);
    }

    #[test]
    fn zero_adjustment_is_rejected() {
        let mut stores = BTreeMap::new();
        let mut ledger = StoreLedger::new(UserId::new(), &mut stores);
        let result = ledger.adjust(Store::Gold, EntryDirection::Credit, 0, LedgerReason::Income);
        assert_eq!(result.err(), Some(LedgerError::ZeroQuantity { store: Store::Gold }));
    }
}
