//! Shared type definitions for the Rowan Tree economy engine.
//!
//! Every crate in the workspace speaks in these types: the rule logic
//! mutates a [`UserAggregate`], the persistence adapters load and save it,
//! and the API serves the read models. Types flow downstream to
//! `TypeScript` via `ts-rs` for the game client.
//!
//! # Modules
//!
//! - [`ids`] -- UUID identifiers for users and journal lines, string keys
//!   for configured features, tiers, and recipes
//! - [`enums`] -- Store catalogue and journal enumerations
//! - [`structs`] -- The user aggregate, journal lines, queue entries, and
//!   read models

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EntryDirection, LedgerReason, Store, UnknownStore};
pub use ids::{FeatureId, LedgerEntryId, RecipeId, TierId, UserId};
pub use structs::{
    ActionQueueEntry, FeatureState, FeatureView, IncomeSource, LedgerDelta, LedgerEntry,
    MerchantView, StoreAmount, StoreFlow, UserAggregate, UserState, WorldStatus,
};
