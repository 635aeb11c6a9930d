//! Lookup tables for items, recipes and facilities

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::{Facility, FacilityId, Item, ItemId, Recipe, RecipeId};

/// Read-only reference data for a solve.
///
/// Entries keep their insertion order, which is the order candidate recipes
/// are offered to a selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    items: Vec<Item>,
    recipes: Vec<Recipe>,
    facilities: Vec<Facility>,
    #[serde(skip)]
    item_index: HashMap<ItemId, usize>,
    #[serde(skip)]
    recipe_index: HashMap<RecipeId, usize>,
    #[serde(skip)]
    facility_index: HashMap<FacilityId, usize>,
    #[serde(skip)]
    producers: HashMap<ItemId, Vec<usize>>,
}

impl Catalog {
    pub fn new(items: Vec<Item>, recipes: Vec<Recipe>, facilities: Vec<Facility>) -> Self {
        let mut catalog = Catalog::default();
        for item in items {
            catalog.insert_item(item);
        }
        for facility in facilities {
            catalog.insert_facility(facility);
        }
        for recipe in recipes {
            catalog.insert_recipe(recipe);
        }
        catalog
    }

    /// Insert or replace an item.
    pub fn insert_item(&mut self, item: Item) {
        match self.item_index.get(&item.id) {
            Some(&idx) => self.items[idx] = item,
            None => {
                self.item_index.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    /// Insert or replace a facility.
    pub fn insert_facility(&mut self, facility: Facility) {
        match self.facility_index.get(&facility.id) {
            Some(&idx) => self.facilities[idx] = facility,
            None => {
                self.facility_index
                    .insert(facility.id.clone(), self.facilities.len());
                self.facilities.push(facility);
            }
        }
    }

    /// Insert or replace a recipe and refresh the producer index.
    pub fn insert_recipe(&mut self, recipe: Recipe) {
        match self.recipe_index.get(&recipe.id) {
            Some(&idx) => {
                self.recipes[idx] = recipe;
                self.rebuild_producers();
            }
            None => {
                let idx = self.recipes.len();
                self.recipe_index.insert(recipe.id.clone(), idx);
                for output in &recipe.outputs {
                    let list = self.producers.entry(output.item.clone()).or_default();
                    if !list.contains(&idx) {
                        list.push(idx);
                    }
                }
                self.recipes.push(recipe);
            }
        }
    }

    fn rebuild_producers(&mut self) {
        self.producers.clear();
        for (idx, recipe) in self.recipes.iter().enumerate() {
            for output in &recipe.outputs {
                let list = self.producers.entry(output.item.clone()).or_default();
                if !list.contains(&idx) {
                    list.push(idx);
                }
            }
        }
    }

    /// Restore the lookup indices after deserialization.
    pub fn reindex(self) -> Self {
        Catalog::new(self.items, self.recipes, self.facilities)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn item(&self, id: &ItemId) -> Result<&Item, PlanError> {
        self.item_index
            .get(id)
            .map(|&idx| &self.items[idx])
            .ok_or_else(|| PlanError::UnknownItem(id.clone()))
    }

    pub fn recipe(&self, id: &RecipeId) -> Result<&Recipe, PlanError> {
        self.recipe_index
            .get(id)
            .map(|&idx| &self.recipes[idx])
            .ok_or_else(|| PlanError::UnknownRecipe(id.clone()))
    }

    pub fn find_recipe(&self, id: &RecipeId) -> Option<&Recipe> {
        self.recipe_index.get(id).map(|&idx| &self.recipes[idx])
    }

    /// The facility that runs `recipe`.
    pub fn facility_for(&self, recipe: &Recipe) -> Result<&Facility, PlanError> {
        self.facility_index
            .get(&recipe.facility)
            .map(|&idx| &self.facilities[idx])
            .ok_or_else(|| PlanError::UnknownFacility {
                recipe: recipe.id.clone(),
                facility: recipe.facility.clone(),
            })
    }

    /// Every recipe listing `item` among its outputs, in catalog order.
    pub fn producers_of(&self, item: &ItemId) -> Vec<&Recipe> {
        self.producers
            .get(item)
            .map(|list| list.iter().map(|&idx| &self.recipes[idx]).collect())
            .unwrap_or_default()
    }

    /// Check every recipe: positive duration, non-negative amounts, known items and facility.
    pub fn validate_recipe(&self, recipe: &Recipe) -> Result<(), PlanError> {
        if !(recipe.duration > 0.0) || !recipe.duration.is_finite() {
            return Err(PlanError::InvalidRecipe {
                recipe: recipe.id.clone(),
                reason: format!("duration must be positive, got {}", recipe.duration),
            });
        }
        for entry in recipe.inputs.iter().chain(&recipe.outputs) {
            if !(entry.amount >= 0.0) || !entry.amount.is_finite() {
                return Err(PlanError::InvalidRecipe {
                    recipe: recipe.id.clone(),
                    reason: format!("amount of {} must be non-negative", entry.item),
                });
            }
            self.item(&entry.item)?;
        }
        self.facility_for(recipe)?;
        Ok(())
    }
}
