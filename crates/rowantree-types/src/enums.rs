//! Enumeration types for the Rowan Tree economy.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// A resource type a user can hold in their stores.
///
/// The set is closed: anything else is rejected when a request or rule
/// table is deserialized, and rejected as corruption when read back from
/// the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Store {
    // --- Gathered ---
    /// Timber from the forest.
    Wood,
    /// Quarried stone.
    Stone,
    /// Foraged and farmed food.
    Food,
    /// Pelts from trapping.
    Fur,
    /// Raw meat from trapping and hunting.
    Meat,

    // --- Worked ---
    /// Meat preserved in the smokehouse.
    CuredMeat,
    /// Tanned fur.
    Leather,
    /// Woven cloth.
    Cloth,
    /// Iron from the mine.
    Iron,
    /// Coal from the mine.
    Coal,
    /// Steel from the steelworks.
    Steel,
    /// Sulphur from the mine.
    Sulphur,

    // --- Supplies ---
    /// Torches for expeditions.
    Torch,
    /// Bait for traps.
    Bait,

    // --- Currency ---
    /// Gold coin.
    Gold,
    /// Cut gems.
    Gem,
}

impl Store {
    /// Every store, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::Wood,
        Self::Stone,
        Self::Food,
        Self::Fur,
        Self::Meat,
        Self::CuredMeat,
        Self::Leather,
        Self::Cloth,
        Self::Iron,
        Self::Coal,
        Self::Steel,
        Self::Sulphur,
        Self::Torch,
        Self::Bait,
        Self::Gold,
        Self::Gem,
    ];

    /// Database and wire name of the store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::Food => "food",
            Self::Fur => "fur",
            Self::Meat => "meat",
            Self::CuredMeat => "cured_meat",
            Self::Leather => "leather",
            Self::Cloth => "cloth",
            Self::Iron => "iron",
            Self::Coal => "coal",
            Self::Steel => "steel",
            Self::Sulphur => "sulphur",
            Self::Torch => "torch",
            Self::Bait => "bait",
            Self::Gold => "gold",
            Self::Gem => "gem",
        }
    }
}

impl core::fmt::Display for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A store name that does not match any [`Store`] variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown store: {0}")]
pub struct UnknownStore(pub String);

impl core::str::FromStr for Store {
    type Err = UnknownStore;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|store| store.as_str() == s)
            .ok_or_else(|| UnknownStore(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Ledger journal
// ---------------------------------------------------------------------------

/// Which way a journal line moved a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntryDirection {
    /// Quantity added to the store.
    Credit,
    /// Quantity removed from the store.
    Debit,
}

impl EntryDirection {
    /// Database name of the direction.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

/// The economic event that produced a journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LedgerReason {
    /// Per-tick accrual from an income source.
    Income,
    /// One-time cost paid when a feature activates.
    FeatureCost,
    /// One-time reward granted when a feature activates.
    FeatureReward,
    /// Input or output of a merchant recipe.
    MerchantTransform,
    /// Per-head cost of moving population between tiers.
    TransportCost,
    /// Stores consumed by tier growth.
    TierGrowth,
}

impl LedgerReason {
    /// Database name of the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::FeatureCost => "feature_cost",
            Self::FeatureReward => "feature_reward",
            Self::MerchantTransform => "merchant_transform",
            Self::TransportCost => "transport_cost",
            Self::TierGrowth => "tier_growth",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_names_parse_back() {
        for store in Store::ALL {
            let parsed: Result<Store, _> = store.as_str().parse();
            assert_eq!(parsed.ok(), Some(store));
        }
    }

    #[test]
    fn store_serde_matches_as_str() {
        let json = serde_json::to_string(&Store::CuredMeat).unwrap_or_default();
        assert_eq!(json, "\"cured_meat\"");
    }

    #[test]
    fn unknown_store_is_rejected() {
        let parsed: Result<Store, _> = "mithril".parse();
        assert_eq!(parsed.err(), Some(UnknownStore("mithril".to_owned())));

        let json: Result<Store, _> = serde_json::from_str("\"mithril\"");
        assert!(json.is_err());
    }
}
