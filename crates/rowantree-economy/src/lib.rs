//! Economy rules for Rowan Tree.
//!
//! Everything here is pure: functions take the static [`EconomyRules`]
//! and one user's [`UserAggregate`](rowantree_types::UserAggregate), and
//! either update the aggregate and return the journal lines they produced,
//! or return an [`EconomyError`] and leave the aggregate untouched. No
//! function performs I/O; loading, locking, and saving belong to
//! `rowantree-core`.
//!
//! # Modules
//!
//! - [`error`] -- [`EconomyError`], the failures shared by every operation.
//! - [`rules`] -- The static rule table ([`EconomyRules`]) and its validation.
//! - [`income`] -- Per-tick accrual with population bonuses.
//! - [`features`] -- Unlock predicates and the fixpoint feature evaluator.
//! - [`merchant`] -- Fixed-ratio merchant transforms.
//! - [`population`] -- Transport between adjacent tiers and tier growth.
//!
//! # Tick order
//!
//! The world tick applies [`income::accrue`], then [`features::evaluate`],
//! then [`population::grow`] to the same staged copy of the aggregate.

pub mod error;
pub mod features;
pub mod income;
pub mod merchant;
pub mod population;
pub mod rules;

pub use error::EconomyError;
pub use features::{Activation, active_features, evaluate, feature_views, holds};
pub use income::{Accrual, accrue, income_multiplier_pct};
pub use merchant::{available_recipes, merchant_views, transform};
pub use population::{Growth, Transport, grow, transport};
pub use rules::{
    EconomyRules, FeatureRule, GrowthRule, MerchantRecipe, RulesError, StartingState, TierRule,
    TransportRoute, UnlockPredicate,
};
