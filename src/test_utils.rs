//! Catalog fixtures shared by unit and integration tests.

use crate::catalog::Catalog;
use crate::models::{Facility, Item, ItemAmount, Recipe};

pub const ASSEMBLER: &str = "assembler";
pub const ASSEMBLER_POWER: f64 = 75.0;

/// A recipe run by the assembler.
pub fn recipe(id: &str, inputs: &[(&str, f64)], outputs: &[(&str, f64)], duration: f64) -> Recipe {
    Recipe {
        id: id.into(),
        inputs: inputs.iter().map(|&(i, a)| ItemAmount::new(i, a)).collect(),
        outputs: outputs.iter().map(|&(i, a)| ItemAmount::new(i, a)).collect(),
        duration,
        facility: ASSEMBLER.into(),
    }
}

/// Build a catalog, registering every item the recipes mention plus the assembler.
pub fn catalog_of(recipes: Vec<Recipe>) -> Catalog {
    let mut items: Vec<Item> = Vec::new();
    for recipe in &recipes {
        for entry in recipe.inputs.iter().chain(&recipe.outputs) {
            if !items.iter().any(|i| i.id == entry.item) {
                items.push(Item::new(entry.item.clone(), 0));
            }
        }
    }
    Catalog::new(items, recipes, vec![Facility::new(ASSEMBLER, ASSEMBLER_POWER)])
}

/// x <- 2 y, one facility makes 5 x/min.
pub fn chain_catalog() -> Catalog {
    catalog_of(vec![recipe("make-x", &[("y", 2.0)], &[("x", 1.0)], 12.0)])
}

/// gear <- plate, pipe <- plate, plate <- ore.
pub fn shared_catalog() -> Catalog {
    catalog_of(vec![
        recipe("make-gear", &[("plate", 2.0)], &[("gear", 1.0)], 1.0),
        recipe("make-pipe", &[("plate", 1.0)], &[("pipe", 1.0)], 1.0),
        recipe("smelt", &[("ore", 1.0)], &[("plate", 1.0)], 2.0),
    ])
}

/// a <- b and b <- a with no outside inputs; each craft doubles its output.
pub fn loop_catalog() -> Catalog {
    catalog_of(vec![
        recipe("make-a", &[("b", 1.0)], &[("a", 2.0)], 1.0),
        recipe("make-b", &[("a", 1.0)], &[("b", 2.0)], 1.0),
    ])
}

/// A loop fed from outside: seed <- ore + sprout, sprout <- seed.
pub fn fed_loop_catalog() -> Catalog {
    catalog_of(vec![
        recipe("grow", &[("sprout", 1.0), ("water", 2.0)], &[("seed", 3.0)], 6.0),
        recipe("plant", &[("seed", 1.0)], &[("sprout", 1.0)], 3.0),
    ])
}

/// A loop whose entry recipe also makes z, an item outside the loop.
///
/// refine: b -> a + z, recycle: a -> 2 b.
pub fn byproduct_loop_catalog() -> Catalog {
    catalog_of(vec![
        recipe("refine", &[("b", 1.0)], &[("a", 1.0), ("z", 1.0)], 1.0),
        recipe("recycle", &[("a", 1.0)], &[("b", 2.0)], 1.0),
    ])
}

/// The fed seed loop plus bread baked from seeds, so two targets can draw on one loop.
pub fn shared_loop_catalog() -> Catalog {
    let mut catalog = fed_loop_catalog();
    catalog.insert_item(Item::new("bread", 0));
    catalog.insert_recipe(recipe("bake", &[("seed", 2.0)], &[("bread", 1.0)], 2.0));
    catalog
}
