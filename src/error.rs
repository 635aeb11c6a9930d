//! Fatal solve errors and non-fatal diagnostics

use serde::Serialize;

use crate::models::{FacilityId, ItemId, RecipeId};

/// Errors that abort a solve.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("no targets given")]
    EmptyTargets,
    #[error("target {item} has invalid rate {rate}, rates must be positive")]
    InvalidTargetRate { item: ItemId, rate: f64 },
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("unknown recipe: {0}")]
    UnknownRecipe(RecipeId),
    #[error("recipe {recipe} references unknown facility {facility}")]
    UnknownFacility {
        recipe: RecipeId,
        facility: FacilityId,
    },
    #[error("override for {item} names missing recipe {recipe}")]
    MissingOverrideRecipe { item: ItemId, recipe: RecipeId },
    #[error("override recipe {recipe} does not produce {item}")]
    OverrideDoesNotProduce { item: ItemId, recipe: RecipeId },
    #[error("invalid recipe {recipe}: {reason}")]
    InvalidRecipe { recipe: RecipeId, reason: String },
}

/// Recovered problems; the plan is still produced but may be approximate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// A loop's linear system asked for a negative facility count, clamped to zero.
    NegativeCycleSolution {
        cycle: String,
        recipe: RecipeId,
        value: f64,
    },
    /// A loop's linear system has no unique solution; its recipes get zero facilities.
    SingularCycleSystem { cycle: String },
    /// A loop has a different number of items and recipes and was solved by least squares.
    NonSquareCycleSystem {
        cycle: String,
        items: usize,
        recipes: usize,
    },
    /// A loop-closing reference has no producing recipe to point back to.
    UnresolvedCycleClosure { item: ItemId },
    /// A pool ran dry before a consumer's demand was met.
    AllocationShortfall {
        recipe: RecipeId,
        item: ItemId,
        shortfall: f64,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::NegativeCycleSolution {
                cycle,
                recipe,
                value,
            } => write!(
                f,
                "loop {cycle}: recipe {recipe} solved to {value:.4} facilities, clamped to 0"
            ),
            Diagnostic::SingularCycleSystem { cycle } => {
                write!(f, "loop {cycle}: linear system is singular, counts set to 0")
            }
            Diagnostic::NonSquareCycleSystem {
                cycle,
                items,
                recipes,
            } => write!(
                f,
                "loop {cycle}: {items} items vs {recipes} recipes, solved by least squares"
            ),
            Diagnostic::UnresolvedCycleClosure { item } => {
                write!(f, "loop closure at {item} has no producer, edge skipped")
            }
            Diagnostic::AllocationShortfall {
                recipe,
                item,
                shortfall,
            } => write!(f, "pool {recipe}/{item} is short by {shortfall:.4}/min"),
        }
    }
}
