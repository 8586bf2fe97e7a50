//! Per-user store ledger for the Rowan Tree economy.
//!
//! Every change to a user's stores goes through this crate. Quantities are
//! unsigned and every mutation is checked, so a store can never go negative
//! and never wrap. Each applied movement produces a [`LedgerEntry`] journal
//! line that is persisted alongside the user's new balances.
//!
//! # Architecture
//!
//! - [`ledger`] -- [`StoreLedger`]: reads and single adjustments over one
//!   user's stores, accumulating a journal.
//! - [`transaction`] -- [`TransactionBuilder`] and [`LedgerTransaction`]:
//!   multi-line movements that apply entirely or not at all.
//! - [`reconcile`] -- Journal summaries and the balance reconciliation run
//!   before a tick commits.
//!
//! # Reconciliation
//!
//! For every user U and store S touched by a unit of work:
//!
//! ```text
//! after(U, S) == before(U, S) + credits(U, S) - debits(U, S)
//! ```
//!
//! A violation produces a [`LedgerAnomaly`] and the unit of work is
//! discarded.
//!
//! # Usage
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use rowantree_ledger::{StoreLedger, TransactionBuilder};
//! use rowantree_types::{LedgerReason, Store, UserId};
//!
//! let user = UserId::new();
//! let mut stores = BTreeMap::from([(Store::Gold, 100)]);
//! let mut ledger = StoreLedger::new(user, &mut stores);
//!
//! let trade = TransactionBuilder::new(user, LedgerReason::MerchantTransform)
//!     .debit(Store::Gold, 100)
//!     .credit(Store::Gem, 1)
//!     .build();
//! assert!(trade.is_ok());
//! if let Ok(trade) = trade {
//!     assert!(ledger.apply(&trade).is_ok());
//! }
//!
//! assert_eq!(ledger.get(Store::Gold), 0);
//! assert_eq!(ledger.get(Store::Gem), 1);
//! assert_eq!(ledger.journal().len(), 2);
//! ```

pub mod ledger;
pub mod reconcile;
pub mod transaction;

// Re-export primary types at crate root.
pub use ledger::StoreLedger;
pub use reconcile::{ReconcileResult, delta, reconcile, summarize};
pub use transaction::{LedgerTransaction, TransactionBuilder};

use std::collections::BTreeMap;

use rowantree_types::{Store, UserId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when building or applying ledger movements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A line must move a strictly positive quantity.
    #[error("ledger line for {store} must move a non-zero quantity")]
    ZeroQuantity {
        /// The store named by the offending line.
        store: Store,
    },

    /// A transaction must contain at least one line.
    #[error("ledger transaction has no lines")]
    EmptyTransaction,

    /// A debit would drive a store below zero.
    #[error("insufficient {store}: requested {requested}, available {available}")]
    Insufficient {
        /// The store being debited.
        store: Store,
        /// The total quantity the transaction debits.
        requested: u64,
        /// The quantity available to cover it.
        available: u64,
    },

    /// A credit would push a store past `u64::MAX`.
    #[error("store {store} would overflow")]
    Overflow {
        /// The store being credited.
        store: Store,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A reconciliation failure: balances that do not match their journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// The user whose books did not balance.
    pub user_id: UserId,
    /// Per-store `(expected, actual)` balances. `expected` is `None` when
    /// the journal itself drives the balance out of range.
    pub mismatches: BTreeMap<Store, (Option<u64>, u64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
