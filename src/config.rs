//! Solve options and plan files

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{ItemId, Recipe, RecipeId, Target};

/// Picks one recipe out of several that can produce an item.
///
/// `path` holds the items from the target down to `item` itself, outermost first.
/// `candidates` is never empty.
pub trait RecipeSelector {
    fn select<'a>(&self, item: &ItemId, candidates: &[&'a Recipe], path: &[ItemId]) -> &'a Recipe;
}

/// Prefers the first candidate that does not consume an item already on the path.
///
/// Falls back to the first candidate when every one of them would close a loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvoidPathSelector;

impl RecipeSelector for AvoidPathSelector {
    fn select<'a>(
        &self,
        _item: &ItemId,
        candidates: &[&'a Recipe],
        path: &[ItemId],
    ) -> &'a Recipe {
        candidates
            .iter()
            .copied()
            .find(|recipe| {
                !recipe
                    .inputs
                    .iter()
                    .any(|input| path.contains(&input.item))
            })
            .unwrap_or(candidates[0])
    }
}

/// Always takes the first candidate in catalog order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstRecipeSelector;

impl RecipeSelector for FirstRecipeSelector {
    fn select<'a>(&self, _: &ItemId, candidates: &[&'a Recipe], _: &[ItemId]) -> &'a Recipe {
        candidates[0]
    }
}

/// Per-solve configuration.
pub struct SolveOptions {
    /// Item -> recipe that must be used for it.
    pub recipe_overrides: BTreeMap<ItemId, RecipeId>,
    /// Items treated as raw even when a recipe exists.
    pub raw_materials: BTreeSet<ItemId>,
    pub selector: Box<dyn RecipeSelector>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            recipe_overrides: BTreeMap::new(),
            raw_materials: BTreeSet::new(),
            selector: Box::new(AvoidPathSelector),
        }
    }
}

impl fmt::Debug for SolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveOptions")
            .field("recipe_overrides", &self.recipe_overrides)
            .field("raw_materials", &self.raw_materials)
            .finish_non_exhaustive()
    }
}

impl SolveOptions {
    pub fn with_override(mut self, item: impl Into<ItemId>, recipe: impl Into<RecipeId>) -> Self {
        self.recipe_overrides.insert(item.into(), recipe.into());
        self
    }

    pub fn with_raw(mut self, item: impl Into<ItemId>) -> Self {
        self.raw_materials.insert(item.into());
        self
    }

    pub fn with_selector(mut self, selector: impl RecipeSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }
}

/// A plan described in TOML.
///
/// ```toml
/// raw = ["iron-ore"]
///
/// [[targets]]
/// item = "gear"
/// rate = 30.0
///
/// [overrides]
/// plate = "smelt-plate"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub overrides: BTreeMap<ItemId, RecipeId>,
    #[serde(default)]
    pub raw: BTreeSet<ItemId>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse plan {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Options for this plan using the default selector.
    pub fn options(&self) -> SolveOptions {
        SolveOptions {
            recipe_overrides: self.overrides.clone(),
            raw_materials: self.raw.clone(),
            ..SolveOptions::default()
        }
    }
}

/// Parse `item=rate` as given on the command line.
pub fn parse_target(arg: &str) -> Result<Target, String> {
    let (item, rate) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=RATE, got '{arg}'"))?;
    let rate: f64 = rate
        .trim()
        .parse()
        .map_err(|_| format!("invalid rate '{rate}' for {item}"))?;
    Ok(Target::new(item.trim(), rate))
}

/// Parse `item=recipe` as given on the command line.
pub fn parse_override(arg: &str) -> Result<(ItemId, RecipeId), String> {
    let (item, recipe) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=RECIPE, got '{arg}'"))?;
    Ok((item.trim().into(), recipe.trim().into()))
}
