//! Income Model: per-tick accrual from a user's enabled income sources.
//!
//! Each enabled source credits its rate scaled by the population bonus:
//!
//! ```text
//! multiplier_pct = 100 + sum(tier count * tier income_bonus_pct)
//! credited       = rate * multiplier_pct / 100
//! ```
//!
//! Every credit of one accrual is applied as a single ledger transaction,
//! so either all sources pay out or none do. Accrual reads population but
//! only writes stores.

use std::collections::BTreeMap;

use rowantree_ledger::{StoreLedger, TransactionBuilder};
use rowantree_types::{LedgerEntry, LedgerReason, Store, UserAggregate};
use tracing::debug;

use crate::error::EconomyError;
use crate::rules::EconomyRules;

/// The outcome of one accrual.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accrual {
    /// Quantity added per store. Stores that received nothing are absent.
    pub added: BTreeMap<Store, u64>,
    /// Journal lines for the credits.
    pub journal: Vec<LedgerEntry>,
}

/// The population income multiplier, in percent.
///
/// # Errors
///
/// Returns [`EconomyError::Overflow`] if the bonus sum exceeds `u64::MAX`.
pub fn income_multiplier_pct(
    rules: &EconomyRules,
    aggregate: &UserAggregate,
) -> Result<u64, EconomyError> {
    rules.tiers.iter().try_fold(100_u64, |pct, tier| {
        aggregate
            .tier_count(&tier.id)
            .checked_mul(tier.income_bonus_pct)
            .and_then(|bonus| pct.checked_add(bonus))
            .ok_or(EconomyError::Overflow("income multiplier"))
    })
}

/// Credit every enabled income source once.
///
/// # Errors
///
/// Returns [`EconomyError::Overflow`] if a scaled rate or a resulting
/// balance exceeds `u64::MAX`; the aggregate is unchanged in that case.
pub fn accrue(rules: &EconomyRules, aggregate: &mut UserAggregate) -> Result<Accrual, EconomyError> {
    let multiplier = income_multiplier_pct(rules, aggregate)?;

    let mut added = BTreeMap::new();
    for (store, source) in &aggregate.incomes {
        if !source.enabled || source.rate == 0 {
            continue;
        }
        let amount = source
            .rate
            .checked_mul(multiplier)
            .and_then(|scaled| scaled.checked_div(100))
            .ok_or(EconomyError::Overflow("income rate"))?;
        if amount > 0 {
            added.insert(*store, amount);
        }
    }

    if added.is_empty() {
        return Ok(Accrual::default());
    }

    let user_id = aggregate.user_id;
    let transaction = added
        .iter()
        .fold(
            TransactionBuilder::new(user_id, LedgerReason::Income),
            |builder, (store, amount)| builder.credit(*store, *amount),
        )
        .build()?;

    let mut ledger = StoreLedger::new(user_id, &mut aggregate.stores);
    ledger.apply(&transaction)?;
    let journal = ledger.into_journal();

    debug!(
        user_id = %user_id,
        multiplier_pct = multiplier,
        stores = added.len(),
        "Accrued income"
    );

    Ok(Accrual { added, journal })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowantree_types::{IncomeSource, TierId, UserId};

    use crate::rules::TierRule;

    fn flat_rules() -> EconomyRules {
        EconomyRules {
            tiers: vec![TierRule {
                id: TierId::from("a"),
                income_bonus_pct: 0,
            }],
            ..EconomyRules::default()
        }
    }

    #[test]
    fn enabled_sources_credit_their_rate() {
        let mut user = UserAggregate::new(UserId::new());
        user.stores.insert(Store::Gold, 5);
        user.incomes.insert(Store::Gold, IncomeSource::enabled(10));

        let accrual = accrue(&flat_rules(), &mut user);
        assert!(accrual.is_ok());
        let accrual = accrual.unwrap_or_default();

        assert_eq!(user.store(Store::Gold), 15);
        assert_eq!(accrual.added, BTreeMap::from([(Store::Gold, 10)]));
        assert_eq!(accrual.journal.len(), 1);
    }

    #[test]
    fn disabled_and_zero_sources_add_nothing() {
        let mut user = UserAggregate::new(UserId::new());
        user.incomes.insert(
            Store::Wood,
            IncomeSource {
                rate: 4,
                enabled: false,
            },
        );
        user.incomes.insert(Store::Food, IncomeSource::enabled(0));
        let before = user.clone();

        let accrual = accrue(&flat_rules(), &mut user).unwrap_or_default();
        assert!(accrual.added.is_empty());
        assert!(accrual.journal.is_empty());
        assert_eq!(user, before);
    }

    #[test]
    fn population_bonus_scales_income() {
        let rules = EconomyRules::default();
        let mut user = UserAggregate::new(UserId::new());
        user.population.insert(TierId::from("villagers"), 10);
        user.incomes.insert(Store::Wood, IncomeSource::enabled(10));

        // 100 + 10 villagers * 2% = 120%
        assert_eq!(income_multiplier_pct(&rules, &user).ok(), Some(120));
        assert!(accrue(&rules, &mut user).is_ok());
        assert_eq!(user.store(Store::Wood), 12);
    }

    #[test]
    fn overflow_leaves_stores_untouched() {
        let mut user = UserAggregate::new(UserId::new());
        user.stores.insert(Store::Gold, u64::MAX);
        user.incomes.insert(Store::Gold, IncomeSource::enabled(1));
        user.incomes.insert(Store::Wood, IncomeSource::enabled(1));

        let result = accrue(&flat_rules(), &mut user);
        assert_eq!(result.err(), Some(EconomyError::Overflow("ledger balance")));
        assert_eq!(user.store(Store::Wood), 0);
    }
}
