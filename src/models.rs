//! Data models for catalog entries and solved production plans

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifies an item in the catalog.
    ItemId
);
string_id!(
    /// Identifies a recipe in the catalog.
    RecipeId
);
string_id!(
    /// Identifies a facility type in the catalog.
    FacilityId
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub name: Option<String>,
    /// Ordering hint, lower tiers are closer to raw materials.
    #[serde(default)]
    pub tier: i32,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, tier: i32) -> Self {
        Self {
            id: id.into(),
            name: None,
            tier,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    #[serde(default)]
    pub name: Option<String>,
    /// Power drawn by one running facility.
    #[serde(default)]
    pub power: f64,
}

impl Facility {
    pub fn new(id: impl Into<FacilityId>, power: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            power,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// One (item, amount) entry of a recipe's inputs or outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAmount {
    pub item: ItemId,
    pub amount: f64,
}

impl ItemAmount {
    pub fn new(item: impl Into<ItemId>, amount: f64) -> Self {
        Self {
            item: item.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    #[serde(default)]
    pub inputs: Vec<ItemAmount>,
    #[serde(default)]
    pub outputs: Vec<ItemAmount>,
    /// Seconds per craft.
    pub duration: f64,
    pub facility: FacilityId,
}

impl Recipe {
    /// Crafts per minute for a single facility.
    pub fn crafts_per_minute(&self) -> f64 {
        60.0 / self.duration
    }

    /// Per-minute output of `item` for one facility, zero if the recipe does not make it.
    pub fn output_rate(&self, item: &ItemId) -> f64 {
        self.outputs
            .iter()
            .filter(|o| &o.item == item)
            .map(|o| o.amount)
            .sum::<f64>()
            * self.crafts_per_minute()
    }

    /// Per-minute consumption of `item` for one facility.
    pub fn input_rate(&self, item: &ItemId) -> f64 {
        self.inputs
            .iter()
            .filter(|i| &i.item == item)
            .map(|i| i.amount)
            .sum::<f64>()
            * self.crafts_per_minute()
    }

    pub fn produces(&self, item: &ItemId) -> bool {
        self.outputs.iter().any(|o| &o.item == item)
    }

    /// The output with the largest per-minute rate, first one wins on ties.
    pub fn dominant_output(&self) -> Option<&ItemAmount> {
        let mut best: Option<&ItemAmount> = None;
        for output in &self.outputs {
            match best {
                Some(b) if output.amount <= b.amount => {}
                _ => best = Some(output),
            }
        }
        best
    }
}

/// A requested item and its rate in items per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub item: ItemId,
    pub rate: f64,
}

impl Target {
    pub fn new(item: impl Into<ItemId>, rate: f64) -> Self {
        Self {
            item: item.into(),
            rate,
        }
    }
}

/// Result of assembling a plan: one node of a target's production tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionNode {
    pub item: ItemId,
    pub recipe: Option<RecipeId>,
    pub facility: Option<FacilityId>,
    pub facility_count: f64,
    /// Items per minute required at this position of the tree.
    pub rate: f64,
    pub power: f64,
    pub dependencies: Vec<ProductionNode>,
    pub is_raw: bool,
    pub is_target: bool,
    /// Back-reference closing a loop, never expanded.
    pub is_cycle_placeholder: bool,
}

impl ProductionNode {
    pub fn raw(item: ItemId, rate: f64) -> Self {
        Self {
            item,
            recipe: None,
            facility: None,
            facility_count: 0.0,
            rate,
            power: 0.0,
            dependencies: Vec::new(),
            is_raw: true,
            is_target: false,
            is_cycle_placeholder: false,
        }
    }

    pub fn cycle_placeholder(item: ItemId, rate: f64) -> Self {
        Self {
            is_raw: false,
            is_cycle_placeholder: true,
            ..Self::raw(item, rate)
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Depth-first walk over this node and every descendant.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ProductionNode)) {
        visit(self);
        for dep in &self.dependencies {
            dep.walk(visit);
        }
    }
}

/// A circular production loop as seen by consumers of a solved plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCycle {
    pub id: String,
    pub items: Vec<ItemId>,
    pub break_point: ItemId,
    pub nodes: Vec<ProductionNode>,
    /// Net extractable output per item for one craft of every loop recipe.
    pub net_output: BTreeMap<ItemId, f64>,
    /// Per-minute draw of items the loop takes from outside itself.
    pub external_inputs: BTreeMap<ItemId, f64>,
}

/// One discrete facility unit of a recipe's facility count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityInstance {
    pub index: usize,
    /// Full-load output rate.
    pub max_rate: f64,
    /// Assigned output rate, below `max_rate` only for the fractional remainder.
    pub actual_rate: f64,
}

impl FacilityInstance {
    pub fn load(&self) -> f64 {
        if self.max_rate > 0.0 {
            self.actual_rate / self.max_rate
        } else {
            0.0
        }
    }
}

/// Where material in a [`FlowAllocation`] comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowSource {
    Instance {
        recipe: RecipeId,
        item: ItemId,
        index: usize,
    },
    RawMaterial(ItemId),
}

/// Who receives the material in a [`FlowAllocation`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowSink {
    Instance { recipe: RecipeId, index: usize },
    Target(ItemId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAllocation {
    pub source: FlowSource,
    pub sink: FlowSink,
    pub item: ItemId,
    pub rate: f64,
}
