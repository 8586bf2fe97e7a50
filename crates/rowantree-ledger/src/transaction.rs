//! Multi-line ledger transactions.
//!
//! A [`LedgerTransaction`] groups credits and debits that belong to one
//! logical operation (a merchant trade, a feature unlock, a tick's income).
//! Application nets every line per store, validates every resulting
//! balance, and only then writes them. A failed transaction leaves the
//! stores exactly as they were.

use std::collections::BTreeMap;

use chrono::Utc;

use rowantree_types::{EntryDirection, LedgerEntry, LedgerEntryId, LedgerReason, Store, UserId};

use crate::LedgerError;

/// One requested movement within a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line {
    store: Store,
    direction: EntryDirection,
    quantity: u64,
}

// ---------------------------------------------------------------------------
// Transaction builder
// ---------------------------------------------------------------------------

/// Builder for a validated [`LedgerTransaction`].
///
/// # Examples
///
/// ```
/// use rowantree_ledger::TransactionBuilder;
/// use rowantree_types::{LedgerReason, Store, UserId};
///
/// let tx = TransactionBuilder::new(UserId::new(), LedgerReason::TransportCost)
///     .debit(Store::Food, 6)
///     .reference("settlers->villagers")
///     .build();
///
/// assert!(tx.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    user_id: UserId,
    reason: LedgerReason,
    reference: Option<String>,
    lines: Vec<Line>,
}

impl TransactionBuilder {
    /// Start a transaction for one user and one economic reason.
    pub const fn new(user_id: UserId, reason: LedgerReason) -> Self {
        Self {
            user_id,
            reason,
            reference: None,
            lines: Vec::new(),
        }
    }

    /// Add quantity to a store.
    #[must_use]
    pub fn credit(mut self, store: Store, quantity: u64) -> Self {
        self.lines.push(Line {
            store,
            direction: EntryDirection::Credit,
            quantity,
        });
        self
    }

    /// Remove quantity from a store.
    #[must_use]
    pub fn debit(mut self, store: Store, quantity: u64) -> Self {
        self.lines.push(Line {
            store,
            direction: EntryDirection::Debit,
            quantity,
        });
        self
    }

    /// Tag every resulting journal line with a related rule entry.
    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Validate the lines and produce a [`LedgerTransaction`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EmptyTransaction`] if no line was added.
    /// Returns [`LedgerError::ZeroQuantity`] if any line moves zero.
    pub fn build(self) -> Result<LedgerTransaction, LedgerError> {
        if self.lines.is_empty() {
            return Err(LedgerError::EmptyTransaction);
        }
        if let Some(line) = self.lines.iter().find(|line| line.quantity == 0) {
            return Err(LedgerError::ZeroQuantity { store: line.store });
        }

        Ok(LedgerTransaction {
            user_id: self.user_id,
            reason: self.reason,
            reference: self.reference,
            lines: self.lines,
        })
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A validated, not-yet-applied group of ledger lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    user_id: UserId,
    reason: LedgerReason,
    reference: Option<String>,
    lines: Vec<Line>,
}

impl LedgerTransaction {
    /// The user this transaction belongs to.
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Number of lines in the transaction.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always `false`; the builder rejects empty transactions.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Compute every resulting balance without touching `stores`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] if any store would go below
    /// zero, or [`LedgerError::Overflow`] if any would exceed `u64::MAX`.
    pub fn preview(&self, stores: &BTreeMap<Store, u64>) -> Result<BTreeMap<Store, u64>, LedgerError> {
        let mut credits: BTreeMap<Store, u64> = BTreeMap::new();
        let mut debits: BTreeMap<Store, u64> = BTreeMap::new();

        for line in &self.lines {
            let bucket = match line.direction {
                EntryDirection::Credit => &mut credits,
                EntryDirection::Debit => &mut debits,
            };
            let total = bucket.entry(line.store).or_insert(0);
            *total = total
                .checked_add(line.quantity)
                .ok_or(LedgerError::Overflow { store: line.store })?;
        }

        let touched = credits.keys().chain(debits.keys()).copied();
        let mut staged = BTreeMap::new();
        for store in touched {
            let current = stores.get(&store).copied().unwrap_or(0);
            let credited = credits.get(&store).copied().unwrap_or(0);
            let debited = debits.get(&store).copied().unwrap_or(0);

            let raised = current
                .checked_add(credited)
                .ok_or(LedgerError::Overflow { store })?;
            let next = raised
                .checked_sub(debited)
                .ok_or(LedgerError::Insufficient {
                    store,
                    requested: debited,
                    available: raised,
                })?;
            staged.insert(store, next);
        }

        Ok(staged)
    }

    /// Apply every line to `stores`, or none of them.
    ///
    /// Returns one journal line per transaction line.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure from [`Self::preview`]; in that
    /// case `stores` is unchanged.
    pub fn apply_to(&self, stores: &mut BTreeMap<Store, u64>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let staged = self.preview(stores)?;
        stores.extend(staged);

        let created_at = Utc::now();
        let entries = self
            .lines
            .iter()
            .map(|line| LedgerEntry {
                id: LedgerEntryId::new(),
                user_id: self.user_id,
                store: line.store,
                direction: line.direction,
                quantity: line.quantity,
                reason: self.reason,
                reference: self.reference.clone(),
                created_at,
            })
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new()
    }

    #[test]
    fn builder_rejects_empty_transaction() {
        let result = TransactionBuilder::new(user(), LedgerReason::Income).build();
        assert_eq!(result.err(), Some(LedgerError::EmptyTransaction));
    }

    #[test]
    fn builder_rejects_zero_line() {
        let result = TransactionBuilder::new(user(), LedgerReason::Income)
            .credit(Store::Wood, 3)
            .credit(Store::Gold, 0)
            .build();
        assert_eq!(
            result.err(),
            Some(LedgerError::ZeroQuantity { store: Store::Gold })
        );
    }

    #[test]
    fn trade_moves_both_stores() {
        let mut stores = BTreeMap::from([(Store::Gold, 100)]);
        let tx = TransactionBuilder::new(user(), LedgerReason::MerchantTransform)
            .debit(Store::Gold, 100)
            .credit(Store::Gem, 1)
            .reference("gold_for_gem")
            .build();
        assert!(tx.is_ok());

        if let Ok(tx) = tx {
            let entries = tx.apply_to(&mut stores);
            assert!(entries.is_ok());
            let entries = entries.unwrap_or_default();
            assert_eq!(entries.len(), 2);
            assert!(entries.iter().all(|e| e.reference.as_deref() == Some("gold_for_gem")));
        }

        assert_eq!(stores.get(&Store::Gold), Some(&0));
        assert_eq!(stores.get(&Store::Gem), Some(&1));
    }

    #[test]
    fn failed_debit_leaves_every_store_untouched() {
        let mut stores = BTreeMap::from([(Store::Gold, 50), (Store::Wood, 7)]);
        let before = stores.clone();

        let tx = TransactionBuilder::new(user(), LedgerReason::MerchantTransform)
            .credit(Store::Wood, 5)
            .debit(Store::Gold, 100)
            .build();
        assert!(tx.is_ok());

        if let Ok(tx) = tx {
            let result = tx.apply_to(&mut stores);
            assert_eq!(
                result.err(),
                Some(LedgerError::Insufficient {
                    store: Store::Gold,
                    requested: 100,
                    available: 50,
                })
            );
        }

        assert_eq!(stores, before);
    }

    #[test]
    fn lines_on_the_same_store_are_netted() {
        // A debit larger than the balance succeeds when the same
        // transaction credits enough to cover it.
        let mut stores = BTreeMap::from([(Store::Food, 2)]);
        let tx = TransactionBuilder::new(user(), LedgerReason::TierGrowth)
            .credit(Store::Food, 10)
            .debit(Store::Food, 12)
            .build();
        assert!(tx.is_ok());
        if let Ok(tx) = tx {
            assert!(tx.apply_to(&mut stores).is_ok());
        }
        assert_eq!(stores.get(&Store::Food), Some(&0));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let mut stores = BTreeMap::from([(Store::Gold, u64::MAX)]);
        let tx = TransactionBuilder::new(user(), LedgerReason::Income)
            .credit(Store::Gold, 10)
            .build();
        assert!(tx.is_ok());
        if let Ok(tx) = tx {
            assert_eq!(
                tx.apply_to(&mut stores).err(),
                Some(LedgerError::Overflow { store: Store::Gold })
            );
        }
        assert_eq!(stores.get(&Store::Gold), Some(&u64::MAX));
    }

    #[test]
    fn preview_does_not_mutate() {
        let stores = BTreeMap::from([(Store::Iron, 4)]);
        let tx = TransactionBuilder::new(user(), LedgerReason::FeatureCost)
            .debit(Store::Iron, 4)
            .build();
        assert!(tx.is_ok());
        if let Ok(tx) = tx {
            let staged = tx.preview(&stores);
            assert_eq!(staged.ok(), Some(BTreeMap::from([(Store::Iron, 0)])));
        }
        assert_eq!(stores.get(&Store::Iron), Some(&4));
    }
}
