//! The static economy rule table.
//!
//! Recipes, unlock predicates, the tier graph, growth thresholds, and the
//! starting state of a new user are loaded once at startup (from the
//! `economy` section of `rowantree-config.yaml`) and shared immutably for
//! the life of the process. [`EconomyRules::validate`] rejects tables that
//! refer to tiers or features they do not define.
//!
//! The [`Default`] table is the built-in Rowan Tree economy.

use std::collections::{BTreeMap, BTreeSet};

use rowantree_types::{FeatureId, RecipeId, Store, StoreAmount, TierId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// What a newly created user starts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingState {
    /// Whether new users join the world tick immediately.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Opening store balances.
    #[serde(default)]
    pub stores: BTreeMap<Store, u64>,
    /// Opening income rates (all enabled).
    #[serde(default)]
    pub incomes: BTreeMap<Store, u64>,
    /// Opening population per tier.
    #[serde(default)]
    pub population: BTreeMap<TierId, u64>,
}

impl Default for StartingState {
    fn default() -> Self {
        Self {
            active: true,
            stores: BTreeMap::new(),
            incomes: BTreeMap::new(),
            population: BTreeMap::new(),
        }
    }
}

/// A population tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    /// Tier id.
    pub id: TierId,
    /// Percentage added to every income rate per head in this tier.
    #[serde(default)]
    pub income_bonus_pct: u64,
}

/// An edge in the tier graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRoute {
    /// Source tier.
    pub from: TierId,
    /// Destination tier.
    pub to: TierId,
    /// Whether the route may also be travelled from `to` to `from`.
    #[serde(default)]
    pub bidirectional: bool,
    /// Stores charged per head moved.
    #[serde(default)]
    pub cost: BTreeMap<Store, u64>,
}

/// Population growth fed by a store during the world tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthRule {
    /// The tier that grows.
    pub tier: TierId,
    /// The store consumed.
    pub store: Store,
    /// Store quantity consumed per growth batch.
    pub threshold: u64,
    /// Heads added per growth batch.
    pub growth: u64,
    /// Upper bound on batches per tick.
    #[serde(default)]
    pub max_per_tick: Option<u64>,
    /// Feature that must be active for the rule to apply.
    #[serde(default)]
    pub requires_feature: Option<FeatureId>,
}

/// Condition under which a feature unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockPredicate {
    /// A store holds at least `amount`.
    StoreAtLeast {
        /// The store.
        store: Store,
        /// Minimum quantity.
        amount: u64,
    },
    /// A tier holds at least `count` heads.
    TierAtLeast {
        /// The tier.
        tier: TierId,
        /// Minimum head count.
        count: u64,
    },
    /// Total population across tiers is at least `count`.
    PopulationAtLeast {
        /// Minimum head count.
        count: u64,
    },
    /// Another feature is already active.
    FeatureActive {
        /// The prerequisite feature.
        feature: FeatureId,
    },
    /// Every nested predicate holds.
    All {
        /// Nested predicates.
        of: Vec<UnlockPredicate>,
    },
    /// At least one nested predicate holds.
    Any {
        /// Nested predicates.
        of: Vec<UnlockPredicate>,
    },
}

/// A gated capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRule {
    /// Feature id.
    pub id: FeatureId,
    /// Text shown to the player; stored as the feature detail on unlock.
    #[serde(default)]
    pub description: String,
    /// When the feature unlocks.
    pub unlock: UnlockPredicate,
    /// Stores paid once on unlock. An unaffordable cost defers the unlock.
    #[serde(default)]
    pub cost: BTreeMap<Store, u64>,
    /// Stores granted once on unlock.
    #[serde(default)]
    pub reward: BTreeMap<Store, u64>,
    /// Income rates created or raised on unlock.
    #[serde(default)]
    pub grants_income: BTreeMap<Store, u64>,
}

/// A fixed-ratio merchant conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantRecipe {
    /// Recipe id.
    pub id: RecipeId,
    /// What the recipe consumes.
    pub input: StoreAmount,
    /// What the recipe produces.
    pub output: StoreAmount,
    /// Feature that must be active to trade.
    #[serde(default)]
    pub requires_feature: Option<FeatureId>,
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// The complete static rule table.
///
/// A section omitted from YAML is empty, not defaulted; only a missing
/// `economy` section falls back to [`EconomyRules::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyRules {
    /// State of a freshly created user.
    #[serde(default)]
    pub starting: StartingState,
    /// Population tiers.
    #[serde(default)]
    pub tiers: Vec<TierRule>,
    /// Tier adjacency.
    #[serde(default)]
    pub routes: Vec<TransportRoute>,
    /// Tier growth, applied in order.
    #[serde(default)]
    pub growth: Vec<GrowthRule>,
    /// Gated features, evaluated in order.
    #[serde(default)]
    pub features: Vec<FeatureRule>,
    /// Merchant recipes.
    #[serde(default)]
    pub merchants: Vec<MerchantRecipe>,
}

/// A rule table that refers to something it does not define, or that
/// contains a meaningless quantity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    /// Two entries share an id.
    #[error("duplicate {kind} id: {id}")]
    DuplicateId {
        /// What kind of entry (`tier`, `feature`, `recipe`).
        kind: &'static str,
        /// The repeated id.
        id: String,
    },

    /// A tier is referenced but not defined.
    #[error("{context} refers to unknown tier {tier}")]
    UnknownTier {
        /// Where the reference appears.
        context: String,
        /// The missing tier.
        tier: TierId,
    },

    /// A feature is referenced but not defined.
    #[error("{context} refers to unknown feature {feature}")]
    UnknownFeature {
        /// Where the reference appears.
        context: String,
        /// The missing feature.
        feature: FeatureId,
    },

    /// A route starts and ends at the same tier.
    #[error("route from {0} to itself")]
    SelfRoute(TierId),

    /// A quantity that must be positive is zero.
    #[error("{0} must be non-zero")]
    ZeroQuantity(String),
}

impl EconomyRules {
    /// Look up a tier.
    pub fn tier(&self, id: &TierId) -> Option<&TierRule> {
        self.tiers.iter().find(|tier| &tier.id == id)
    }

    /// Look up the route that connects `from` to `to`, honouring
    /// bidirectional edges.
    pub fn route(&self, from: &TierId, to: &TierId) -> Option<&TransportRoute> {
        self.routes.iter().find(|route| {
            (&route.from == from && &route.to == to)
                || (route.bidirectional && &route.from == to && &route.to == from)
        })
    }

    /// Look up a feature.
    pub fn feature(&self, id: &FeatureId) -> Option<&FeatureRule> {
        self.features.iter().find(|feature| &feature.id == id)
    }

    /// Look up a merchant recipe.
    pub fn recipe(&self, id: &RecipeId) -> Option<&MerchantRecipe> {
        self.merchants.iter().find(|recipe| &recipe.id == id)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`RulesError`] found.
    pub fn validate(&self) -> Result<(), RulesError> {
        unique("tier", self.tiers.iter().map(|t| t.id.as_str()))?;
        unique("feature", self.features.iter().map(|f| f.id.as_str()))?;
        unique("recipe", self.merchants.iter().map(|r| r.id.as_str()))?;

        for tier in self.starting.population.keys() {
            self.known_tier("starting population", tier)?;
        }

        for route in &self.routes {
            let context = format!("route {} -> {}", route.from, route.to);
            self.known_tier(&context, &route.from)?;
            self.known_tier(&context, &route.to)?;
            if route.from == route.to {
                return Err(RulesError::SelfRoute(route.from.clone()));
            }
        }

        for rule in &self.growth {
            let context = format!("growth rule for {}", rule.tier);
            self.known_tier(&context, &rule.tier)?;
            if rule.threshold == 0 {
                return Err(RulesError::ZeroQuantity(format!("{context} threshold")));
            }
            if rule.growth == 0 {
                return Err(RulesError::ZeroQuantity(format!("{context} growth")));
            }
            if let Some(feature) = &rule.requires_feature {
                self.known_feature(&context, feature)?;
            }
        }

        for feature in &self.features {
            let context = format!("feature {}", feature.id);
            self.check_predicate(&context, &feature.unlock)?;
        }

        for recipe in &self.merchants {
            let context = format!("recipe {}", recipe.id);
            if recipe.input.amount == 0 || recipe.output.amount == 0 {
                return Err(RulesError::ZeroQuantity(format!("{context} quantity")));
            }
            if let Some(feature) = &recipe.requires_feature {
                self.known_feature(&context, feature)?;
            }
        }

        Ok(())
    }

    fn known_tier(&self, context: &str, tier: &TierId) -> Result<(), RulesError> {
        if self.tier(tier).is_some() {
            Ok(())
        } else {
            Err(RulesError::UnknownTier {
                context: context.to_owned(),
                tier: tier.clone(),
            })
        }
    }

    fn known_feature(&self, context: &str, feature: &FeatureId) -> Result<(), RulesError> {
        if self.feature(feature).is_some() {
            Ok(())
        } else {
            Err(RulesError::UnknownFeature {
                context: context.to_owned(),
                feature: feature.clone(),
            })
        }
    }

    fn check_predicate(&self, context: &str, predicate: &UnlockPredicate) -> Result<(), RulesError> {
        match predicate {
            UnlockPredicate::StoreAtLeast { .. } | UnlockPredicate::PopulationAtLeast { .. } => {
                Ok(())
            }
            UnlockPredicate::TierAtLeast { tier, .. } => self.known_tier(context, tier),
            UnlockPredicate::FeatureActive { feature } => self.known_feature(context, feature),
            UnlockPredicate::All { of } | UnlockPredicate::Any { of } => of
                .iter()
                .try_for_each(|nested| self.check_predicate(context, nested)),
        }
    }
}

fn unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), RulesError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(RulesError::DuplicateId {
                kind,
                id: id.to_owned(),
            });
        }
    }
    Ok(())
}

const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Built-in economy
// ---------------------------------------------------------------------------

impl Default for EconomyRules {
    fn default() -> Self {
        let settlers = TierId::from("settlers");
        let villagers = TierId::from("villagers");
        let townsfolk = TierId::from("townsfolk");

        let bonfire = FeatureId::from("bonfire");
        let trap_line = FeatureId::from("trap_line");
        let smokehouse = FeatureId::from("smokehouse");
        let trading_post = FeatureId::from("trading_post");
        let mine = FeatureId::from("mine");
        let steelworks = FeatureId::from("steelworks");

        Self {
            starting: StartingState {
                active: true,
                stores: BTreeMap::from([(Store::Food, 20)]),
                incomes: BTreeMap::from([(Store::Wood, 1), (Store::Food, 1)]),
                population: BTreeMap::from([(settlers.clone(), 3)]),
            },
            tiers: vec![
                TierRule {
                    id: settlers.clone(),
                    income_bonus_pct: 0,
                },
                TierRule {
                    id: villagers.clone(),
                    income_bonus_pct: 2,
                },
                TierRule {
                    id: townsfolk.clone(),
                    income_bonus_pct: 5,
                },
            ],
            routes: vec![
                TransportRoute {
                    from: settlers.clone(),
                    to: villagers.clone(),
                    bidirectional: true,
                    cost: BTreeMap::from([(Store::Food, 2)]),
                },
                TransportRoute {
                    from: villagers.clone(),
                    to: townsfolk.clone(),
                    bidirectional: true,
                    cost: BTreeMap::from([(Store::Food, 3), (Store::Cloth, 1)]),
                },
            ],
            growth: vec![GrowthRule {
                tier: settlers,
                store: Store::Food,
                threshold: 50,
                growth: 1,
                max_per_tick: Some(5),
                requires_feature: Some(bonfire.clone()),
            }],
            features: vec![
                FeatureRule {
                    id: bonfire.clone(),
                    description: "A fire to keep the dark at bay.".to_owned(),
                    unlock: UnlockPredicate::StoreAtLeast {
                        store: Store::Wood,
                        amount: 10,
                    },
                    cost: BTreeMap::from([(Store::Wood, 10)]),
                    reward: BTreeMap::new(),
                    grants_income: BTreeMap::from([(Store::Wood, 1)]),
                },
                FeatureRule {
                    id: trap_line.clone(),
                    description: "Snares strung through the undergrowth.".to_owned(),
                    unlock: UnlockPredicate::All {
                        of: vec![
                            UnlockPredicate::FeatureActive {
                                feature: bonfire,
                            },
                            UnlockPredicate::StoreAtLeast {
                                store: Store::Wood,
                                amount: 30,
                            },
                        ],
                    },
                    cost: BTreeMap::from([(Store::Wood, 30)]),
                    reward: BTreeMap::new(),
                    grants_income: BTreeMap::from([(Store::Fur, 1), (Store::Meat, 1)]),
                },
                FeatureRule {
                    id: smokehouse,
                    description: "Meat hung over smoke keeps through winter.".to_owned(),
                    unlock: UnlockPredicate::All {
                        of: vec![
                            UnlockPredicate::FeatureActive {
                                feature: trap_line,
                            },
                            UnlockPredicate::StoreAtLeast {
                                store: Store::Meat,
                                amount: 20,
                            },
                        ],
                    },
                    cost: BTreeMap::from([(Store::Wood, 20), (Store::Meat, 5)]),
                    reward: BTreeMap::new(),
                    grants_income: BTreeMap::from([(Store::CuredMeat, 1)]),
                },
                FeatureRule {
                    id: trading_post.clone(),
                    description: "Traders stop by the village.".to_owned(),
                    unlock: UnlockPredicate::PopulationAtLeast { count: 10 },
                    cost: BTreeMap::from([(Store::Wood, 50), (Store::Fur, 20)]),
                    reward: BTreeMap::from([(Store::Gold, 5)]),
                    grants_income: BTreeMap::new(),
                },
                FeatureRule {
                    id: mine.clone(),
                    description: "A shaft sunk into the hillside.".to_owned(),
                    unlock: UnlockPredicate::TierAtLeast {
                        tier: villagers,
                        count: 5,
                    },
                    cost: BTreeMap::from([(Store::Wood, 100)]),
                    reward: BTreeMap::new(),
                    grants_income: BTreeMap::from([(Store::Iron, 1), (Store::Coal, 1)]),
                },
                FeatureRule {
                    id: steelworks,
                    description: "Iron and coal become steel.".to_owned(),
                    unlock: UnlockPredicate::All {
                        of: vec![
                            UnlockPredicate::FeatureActive { feature: mine },
                            UnlockPredicate::TierAtLeast {
                                tier: townsfolk,
                                count: 3,
                            },
                        ],
                    },
                    cost: BTreeMap::from([(Store::Iron, 50), (Store::Coal, 50)]),
                    reward: BTreeMap::new(),
                    grants_income: BTreeMap::from([(Store::Steel, 1)]),
                },
            ],
            merchants: vec![
                MerchantRecipe {
                    id: RecipeId::from("fur_for_leather"),
                    input: StoreAmount {
                        store: Store::Fur,
                        amount: 5,
                    },
                    output: StoreAmount {
                        store: Store::Leather,
                        amount: 1,
                    },
                    requires_feature: None,
                },
                MerchantRecipe {
                    id: RecipeId::from("fur_for_gold"),
                    input: StoreAmount {
                        store: Store::Fur,
                        amount: 100,
                    },
                    output: StoreAmount {
                        store: Store::Gold,
                        amount: 1,
                    },
                    requires_feature: Some(trading_post.clone()),
                },
                MerchantRecipe {
                    id: RecipeId::from("cured_meat_for_gold"),
                    input: StoreAmount {
                        store: Store::CuredMeat,
                        amount: 20,
                    },
                    output: StoreAmount {
                        store: Store::Gold,
                        amount: 1,
                    },
                    requires_feature: Some(trading_post.clone()),
                },
                MerchantRecipe {
                    id: RecipeId::from("gold_for_gem"),
                    input: StoreAmount {
                        store: Store::Gold,
                        amount: 100,
                    },
                    output: StoreAmount {
                        store: Store::Gem,
                        amount: 1,
                    },
                    requires_feature: Some(trading_post),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_rules_are_valid() {
        assert_eq!(EconomyRules::default().validate(), Ok(()));
    }

    #[test]
    fn bidirectional_routes_resolve_both_ways() {
        let rules = EconomyRules::default();
        let settlers = TierId::from("settlers");
        let villagers = TierId::from("villagers");
        let townsfolk = TierId::from("townsfolk");

        assert!(rules.route(&settlers, &villagers).is_some());
        assert!(rules.route(&villagers, &settlers).is_some());
        assert!(rules.route(&settlers, &townsfolk).is_none());
    }

    #[test]
    fn unknown_tier_in_route_is_rejected() {
        let mut rules = EconomyRules::default();
        rules.routes.push(TransportRoute {
            from: TierId::from("settlers"),
            to: TierId::from("nobles"),
            bidirectional: false,
            cost: BTreeMap::new(),
        });
        assert!(matches!(
            rules.validate(),
            Err(RulesError::UnknownTier { tier, .. }) if tier.as_str() == "nobles"
        ));
    }

    #[test]
    fn self_route_is_rejected() {
        let mut rules = EconomyRules::default();
        rules.routes.push(TransportRoute {
            from: TierId::from("settlers"),
            to: TierId::from("settlers"),
            bidirectional: false,
            cost: BTreeMap::new(),
        });
        assert_eq!(
            rules.validate(),
            Err(RulesError::SelfRoute(TierId::from("settlers")))
        );
    }

    #[test]
    fn nested_predicate_references_are_checked() {
        let mut rules = EconomyRules::default();
        rules.features.push(FeatureRule {
            id: FeatureId::from("observatory"),
            description: String::new(),
            unlock: UnlockPredicate::Any {
                of: vec![UnlockPredicate::FeatureActive {
                    feature: FeatureId::from("telescope"),
                }],
            },
            cost: BTreeMap::new(),
            reward: BTreeMap::new(),
            grants_income: BTreeMap::new(),
        });
        assert!(matches!(
            rules.validate(),
            Err(RulesError::UnknownFeature { feature, .. }) if feature.as_str() == "telescope"
        ));
    }

    #[test]
    fn duplicate_recipe_is_rejected() {
        let mut rules = EconomyRules::default();
        let copy = rules.merchants.first().cloned();
        if let Some(copy) = copy {
            rules.merchants.push(copy);
        }
        assert!(matches!(
            rules.validate(),
            Err(RulesError::DuplicateId { kind: "recipe", .. })
        ));
    }

    #[test]
    fn zero_growth_threshold_is_rejected() {
        let mut rules = EconomyRules::default();
        if let Some(rule) = rules.growth.first_mut() {
            rule.threshold = 0;
        }
        assert!(matches!(rules.validate(), Err(RulesError::ZeroQuantity(_))));
    }

    #[test]
    fn rules_parse_from_yaml() {
        let yaml = r"
starting:
  stores: { gold: 5 }
  incomes: { gold: 10 }
  population: { a: 5 }
tiers:
  - { id: a }
  - { id: b, income_bonus_pct: 3 }
routes:
  - { from: a, to: b }
features:
  - id: vault
    unlock:
      kind: all
      of:
        - { kind: store_at_least, store: gold, amount: 100 }
        - { kind: tier_at_least, tier: b, count: 1 }
merchants:
  - { id: gold_for_gem, input: { store: gold, amount: 100 }, output: { store: gem, amount: 1 } }
";
        let rules: Result<EconomyRules, _> = serde_yml::from_str(yaml);
        assert!(rules.is_ok(), "{rules:?}");
        let rules = rules.unwrap_or_default();

        assert!(rules.starting.active);
        assert_eq!(rules.starting.incomes.get(&Store::Gold), Some(&10));
        assert_eq!(rules.tiers.len(), 2);
        assert!(rules.growth.is_empty());
        assert!(rules.recipe(&RecipeId::from("gold_for_gem")).is_some());
        assert_eq!(rules.validate(), Ok(()));
    }
}
