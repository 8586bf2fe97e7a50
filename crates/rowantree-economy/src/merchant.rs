//! Merchant Transform Engine.
//!
//! A transform debits a recipe's input and credits its output as one
//! ledger transaction. If the input is short, nothing moves.

use rowantree_ledger::{StoreLedger, TransactionBuilder};
use rowantree_types::{LedgerEntry, LedgerReason, MerchantView, RecipeId, UserAggregate};
use tracing::debug;

use crate::error::EconomyError;
use crate::rules::{EconomyRules, MerchantRecipe};

/// Recipes whose feature gate the user has passed.
pub fn available_recipes<'r>(
    rules: &'r EconomyRules,
    aggregate: &UserAggregate,
) -> impl Iterator<Item = &'r MerchantRecipe> {
    rules.merchants.iter().filter(move |recipe| {
        recipe
            .requires_feature
            .as_ref()
            .is_none_or(|feature| aggregate.feature_active(feature))
    })
}

/// Read model of [`available_recipes`].
pub fn merchant_views(rules: &EconomyRules, aggregate: &UserAggregate) -> Vec<MerchantView> {
    available_recipes(rules, aggregate)
        .map(|recipe| MerchantView {
            id: recipe.id.clone(),
            input: recipe.input,
            output: recipe.output,
        })
        .collect()
}

/// Perform one merchant transform.
///
/// # Errors
///
/// - [`EconomyError::UnknownRecipe`] if no recipe has this id.
/// - [`EconomyError::RecipeUnavailable`] if its feature is not active.
/// - [`EconomyError::InsufficientResources`] if the input store is short.
///
/// The aggregate is unchanged on every error.
pub fn transform(
    rules: &EconomyRules,
    aggregate: &mut UserAggregate,
    recipe_id: &RecipeId,
) -> Result<Vec<LedgerEntry>, EconomyError> {
    let recipe = rules
        .recipe(recipe_id)
        .ok_or_else(|| EconomyError::UnknownRecipe(recipe_id.clone()))?;

    if let Some(feature) = recipe
        .requires_feature
        .as_ref()
        .filter(|feature| !aggregate.feature_active(feature))
    {
        return Err(EconomyError::RecipeUnavailable {
            recipe: recipe.id.clone(),
            feature: feature.clone(),
        });
    }

    let available = aggregate.store(recipe.input.store);
    if available < recipe.input.amount {
        return Err(EconomyError::InsufficientResources {
            store: recipe.input.store,
            requested: recipe.input.amount,
            available,
        });
    }

    let user_id = aggregate.user_id;
    let transaction = TransactionBuilder::new(user_id, LedgerReason::MerchantTransform)
        .debit(recipe.input.store, recipe.input.amount)
        .credit(recipe.output.store, recipe.output.amount)
        .reference(recipe.id.as_str())
        .build()?;

    let mut ledger = StoreLedger::new(user_id, &mut aggregate.stores);
    ledger.apply(&transaction)?;

    debug!(user_id = %user_id, recipe = %recipe.id, "Merchant transform applied");
    Ok(ledger.into_journal())
}
