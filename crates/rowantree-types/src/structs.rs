//! Core value structs: the per-user aggregate, journal lines, queue
//! entries, and the read models served to clients and operators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EntryDirection, LedgerReason, Store};
use crate::ids::{FeatureId, LedgerEntryId, RecipeId, TierId, UserId};

// ---------------------------------------------------------------------------
// User aggregate
// ---------------------------------------------------------------------------

/// A recurring per-tick accrual into one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncomeSource {
    /// Quantity credited per tick before population bonuses.
    pub rate: u64,
    /// Disabled sources keep their rate but accrue nothing.
    pub enabled: bool,
}

impl IncomeSource {
    /// An enabled source at the given rate.
    pub const fn enabled(rate: u64) -> Self {
        Self {
            rate,
            enabled: true,
        }
    }
}

/// Per-user state of one gated feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FeatureState {
    /// Whether the feature has been unlocked. Never reverts.
    pub active: bool,
    /// Detail text captured at activation.
    pub detail: Option<String>,
    /// When the feature was unlocked.
    pub activated_at: Option<DateTime<Utc>>,
}

/// Everything the engine knows about one user, loaded and saved as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserAggregate {
    /// The owning user.
    pub user_id: UserId,
    /// Inactive users are skipped by the world tick.
    pub active: bool,
    /// Optimistic-concurrency counter, bumped by every successful save.
    pub version: u64,
    /// Store quantities. Missing entries read as zero.
    pub stores: BTreeMap<Store, u64>,
    /// Income sources keyed by the store they feed.
    pub incomes: BTreeMap<Store, IncomeSource>,
    /// Feature states keyed by feature id.
    pub features: BTreeMap<FeatureId, FeatureState>,
    /// Population head count per tier.
    pub population: BTreeMap<TierId, u64>,
}

impl UserAggregate {
    /// An empty, active aggregate at version zero.
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            active: true,
            version: 0,
            stores: BTreeMap::new(),
            incomes: BTreeMap::new(),
            features: BTreeMap::new(),
            population: BTreeMap::new(),
        }
    }

    /// Quantity held in a store (zero when absent).
    pub fn store(&self, store: Store) -> u64 {
        self.stores.get(&store).copied().unwrap_or(0)
    }

    /// Head count in a tier (zero when absent).
    pub fn tier_count(&self, tier: &TierId) -> u64 {
        self.population.get(tier).copied().unwrap_or(0)
    }

    /// Whether a feature has been unlocked.
    pub fn feature_active(&self, feature: &FeatureId) -> bool {
        self.features.get(feature).is_some_and(|state| state.active)
    }

    /// Head count across all tiers, saturating at `u64::MAX`.
    pub fn total_population(&self) -> u64 {
        self.population
            .values()
            .fold(0_u64, |total, count| total.saturating_add(*count))
    }
}

// ---------------------------------------------------------------------------
// Ledger journal
// ---------------------------------------------------------------------------

/// A store and a quantity, as used in recipes and rule tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StoreAmount {
    /// The store.
    pub store: Store,
    /// The quantity.
    pub amount: u64,
}

/// One applied movement of one store for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerEntry {
    /// Unique journal line identifier.
    pub id: LedgerEntryId,
    /// The user whose store moved.
    pub user_id: UserId,
    /// The store that moved.
    pub store: Store,
    /// Credit or debit.
    pub direction: EntryDirection,
    /// Quantity moved (always positive).
    pub quantity: u64,
    /// The economic event behind the movement.
    pub reason: LedgerReason,
    /// Related rule entry, such as a recipe or feature id.
    pub reference: Option<String>,
    /// When the movement was applied.
    pub created_at: DateTime<Utc>,
}

/// Total credited and debited quantity for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StoreFlow {
    /// Sum of credits.
    pub credited: u64,
    /// Sum of debits.
    pub debited: u64,
}

/// The ledger effect of one synchronous operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerDelta {
    /// Per-store totals.
    pub flows: BTreeMap<Store, StoreFlow>,
    /// The individual journal lines.
    pub entries: Vec<LedgerEntry>,
}

// ---------------------------------------------------------------------------
// Action queue and world status
// ---------------------------------------------------------------------------

/// A user waiting for the next world tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionQueueEntry {
    /// The queued user.
    pub user_id: UserId,
    /// When the user was first queued in this cycle.
    pub enqueued_at: DateTime<Utc>,
}

/// Operator rollup across all users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldStatus {
    /// Users with the active flag set.
    pub active_user_count: u64,
    /// Population summed over active users.
    pub total_population: u64,
    /// Users waiting in the action queue.
    pub pending_queue_depth: u64,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A feature as presented to its user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FeatureView {
    /// Feature id.
    pub id: FeatureId,
    /// Whether it is unlocked.
    pub active: bool,
    /// Configured description, when details were requested.
    pub description: Option<String>,
}

/// A merchant recipe the user may perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MerchantView {
    /// Recipe id.
    pub id: RecipeId,
    /// What the recipe consumes.
    pub input: StoreAmount,
    /// What the recipe produces.
    pub output: StoreAmount,
}

/// The full state of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserState {
    /// The user.
    pub user_id: UserId,
    /// Active flag.
    pub active: bool,
    /// Store quantities.
    pub stores: BTreeMap<Store, u64>,
    /// Income sources.
    pub incomes: BTreeMap<Store, IncomeSource>,
    /// Every known feature with its state.
    pub features: Vec<FeatureView>,
    /// Population per tier.
    pub population: BTreeMap<TierId, u64>,
    /// Recipes currently available.
    pub merchants: Vec<MerchantView>,
}
