//! Error types for rule evaluation.

use rowantree_ledger::LedgerError;
use rowantree_types::{FeatureId, RecipeId, Store, TierId};

/// Errors returned by the economy operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EconomyError {
    /// A store does not hold enough to cover a debit.
    #[error("insufficient {store}: requested {requested}, available {available}")]
    InsufficientResources {
        /// The store that would go negative.
        store: Store,
        /// The quantity required.
        requested: u64,
        /// The quantity held.
        available: u64,
    },

    /// A tier does not hold enough population for a transport.
    #[error("insufficient population in {tier}: requested {requested}, available {available}")]
    InsufficientPopulation {
        /// The source tier.
        tier: TierId,
        /// Head count requested.
        requested: u64,
        /// Head count held.
        available: u64,
    },

    /// No merchant recipe has this id.
    #[error("unknown recipe: {0}")]
    UnknownRecipe(RecipeId),

    /// The recipe exists but is gated behind a feature the user lacks.
    #[error("recipe {recipe} requires feature {feature}")]
    RecipeUnavailable {
        /// The requested recipe.
        recipe: RecipeId,
        /// The feature that unlocks it.
        feature: FeatureId,
    },

    /// A tier is unknown, or the two tiers are not adjacent.
    #[error("invalid tier move {from} -> {to}: {reason}")]
    InvalidTier {
        /// Requested source tier.
        from: TierId,
        /// Requested destination tier.
        to: TierId,
        /// Which check failed.
        reason: &'static str,
    },

    /// A request quantity is outside its allowed range.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(&'static str),

    /// A computed quantity would exceed `u64::MAX`.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl From<LedgerError> for EconomyError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Insufficient {
                store,
                requested,
                available,
            } => Self::InsufficientResources {
                store,
                requested,
                available,
            },
            LedgerError::Overflow { .. } => Self::Overflow("ledger balance"),
            LedgerError::ZeroQuantity { .. } | LedgerError::EmptyTransaction => {
                Self::InvalidQuantity("ledger transaction")
            }
        }
    }
}
