//! Steady-state production planner
//!
//! Given target output rates and a catalog of items, recipes and facilities,
//! computes how many facilities of each recipe are needed, which raw
//! materials feed them, how circular production loops balance out, and how
//! material flows between individual facility instances.

pub mod catalog;
pub mod condense;
pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod graph;
pub mod import;
pub mod linalg;
pub mod models;
pub mod pool;
pub mod report;
pub mod scc;
pub mod solver;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use catalog::Catalog;
pub use config::{AvoidPathSelector, FirstRecipeSelector, PlanFile, RecipeSelector, SolveOptions};
pub use error::{Diagnostic, PlanError};
pub use models::{
    DetectedCycle, Facility, FacilityId, FacilityInstance, FlowAllocation, FlowSink, FlowSource,
    Item, ItemAmount, ItemId, ProductionNode, Recipe, RecipeId, Target,
};
pub use solver::{SolveResult, solve};
