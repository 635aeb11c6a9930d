//! Discrete facility instances and the allocation of their output to consumers

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Diagnostic;
use crate::flow::FlowSolution;
use crate::graph::{ProductionGraph, RecipeNode};
use crate::models::{
    FacilityId, FacilityInstance, FlowAllocation, FlowSink, FlowSource, ItemId, ProductionNode,
    RecipeId,
};

/// Fractions closer than this to a whole facility are rounded to it.
const COUNT_EPSILON: f64 = 1e-9;

/// One recipe's output of one item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PoolKey {
    pub recipe: RecipeId,
    pub item: ItemId,
}

impl PoolKey {
    pub fn new(recipe: impl Into<RecipeId>, item: impl Into<ItemId>) -> Self {
        Self {
            recipe: recipe.into(),
            item: item.into(),
        }
    }
}

/// A slice of one instance's output handed to a consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    pub index: usize,
    pub amount: f64,
}

#[derive(Debug, Clone)]
struct Pool {
    instances: Vec<FacilityInstance>,
    remaining: Vec<f64>,
}

/// Split a continuous facility count into `ceil(count)` instances, the last
/// one carrying the fractional remainder.
pub fn facility_instances(facility_count: f64, full_rate: f64) -> Vec<FacilityInstance> {
    if !(facility_count > COUNT_EPSILON) {
        return Vec::new();
    }
    let mut whole = facility_count.floor();
    let mut fraction = facility_count - whole;
    if fraction < COUNT_EPSILON {
        fraction = 0.0;
    } else if 1.0 - fraction < COUNT_EPSILON {
        whole += 1.0;
        fraction = 0.0;
    }

    let full = whole as usize;
    let mut instances: Vec<FacilityInstance> = (0..full)
        .map(|index| FacilityInstance {
            index,
            max_rate: full_rate,
            actual_rate: full_rate,
        })
        .collect();
    if fraction > 0.0 {
        instances.push(FacilityInstance {
            index: full,
            max_rate: full_rate,
            actual_rate: fraction * full_rate,
        });
    }
    instances
}

/// Capacity pools keyed by (recipe, item).
///
/// Allocation consumes capacity permanently, so the order of `allocate`
/// calls decides which instance feeds which consumer.
#[derive(Debug, Clone, Default)]
pub struct CapacityPool {
    pools: BTreeMap<PoolKey, Pool>,
    processed: BTreeSet<RecipeId>,
}

impl CapacityPool {
    pub fn create_pool(&mut self, key: PoolKey, facility_count: f64, full_rate: f64) {
        let instances = facility_instances(facility_count, full_rate);
        let remaining = instances.iter().map(|i| i.actual_rate).collect();
        self.pools.insert(
            key,
            Pool {
                instances,
                remaining,
            },
        );
    }

    pub fn has_pool(&self, key: &PoolKey) -> bool {
        self.pools.contains_key(key)
    }

    pub fn facility_instances(&self, key: &PoolKey) -> &[FacilityInstance] {
        self.pools
            .get(key)
            .map(|pool| pool.instances.as_slice())
            .unwrap_or(&[])
    }

    /// Capacity not yet handed out.
    pub fn remaining(&self, key: &PoolKey) -> f64 {
        self.pools
            .get(key)
            .map(|pool| pool.remaining.iter().sum())
            .unwrap_or(0.0)
    }

    /// Draw `demand` from the pool, filling instances in index order.
    ///
    /// Returns at most `demand` in total; less when the pool runs dry.
    pub fn allocate(&mut self, key: &PoolKey, demand: f64) -> Vec<Draw> {
        let mut draws = Vec::new();
        let Some(pool) = self.pools.get_mut(key) else {
            return draws;
        };
        let mut outstanding = demand;
        for (index, remaining) in pool.remaining.iter_mut().enumerate() {
            if outstanding <= 0.0 {
                break;
            }
            if *remaining <= 0.0 {
                continue;
            }
            let amount = outstanding.min(*remaining);
            *remaining -= amount;
            outstanding -= amount;
            draws.push(Draw { index, amount });
        }
        draws
    }

    pub fn is_processed(&self, recipe: &RecipeId) -> bool {
        self.processed.contains(recipe)
    }

    pub fn mark_processed(&mut self, recipe: RecipeId) {
        self.processed.insert(recipe);
    }
}

/// Instances of one pool, as handed to consumers of a solved plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolInstances {
    pub recipe: RecipeId,
    pub item: ItemId,
    pub facility: FacilityId,
    pub instances: Vec<FacilityInstance>,
}

/// Instance-level view of a plan: every facility unit and every flow edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowNetwork {
    pub pools: Vec<PoolInstances>,
    pub allocations: Vec<FlowAllocation>,
}

impl FlowNetwork {
    /// Total rate leaving one instance of a pool.
    pub fn allocated_from(&self, recipe: &RecipeId, item: &ItemId, index: usize) -> f64 {
        self.allocations
            .iter()
            .filter(|a| {
                matches!(&a.source, FlowSource::Instance { recipe: r, item: i, index: n }
                    if r == recipe && i == item && *n == index)
            })
            .map(|a| a.rate)
            .sum()
    }

    /// Total rate delivered to a sink for one item.
    pub fn delivered_to(&self, sink: &FlowSink, item: &ItemId) -> f64 {
        self.allocations
            .iter()
            .filter(|a| &a.sink == sink && &a.item == item)
            .map(|a| a.rate)
            .sum()
    }
}

/// Materialize every recipe into instances and route material between them,
/// following the production trees from each target.
pub fn materialize(
    graph: &ProductionGraph,
    flow: &FlowSolution,
    trees: &[ProductionNode],
    diagnostics: &mut Vec<Diagnostic>,
) -> FlowNetwork {
    let mut materializer = Materializer {
        graph,
        flow,
        pool: CapacityPool::default(),
        network: FlowNetwork::default(),
        diagnostics,
    };
    for node in graph.recipe_nodes() {
        for item in &node.outputs {
            materializer.ensure_pool(node, item);
        }
    }
    for tree in trees {
        materializer.deliver(FlowSink::Target(tree.item.clone()), tree, tree.rate);
        materializer.expand(tree);
    }
    debug!(
        pools = materializer.network.pools.len(),
        allocations = materializer.network.allocations.len(),
        "materialized flow network"
    );
    materializer.network
}

struct Materializer<'a> {
    graph: &'a ProductionGraph,
    flow: &'a FlowSolution,
    pool: CapacityPool,
    network: FlowNetwork,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Materializer<'_> {
    fn ensure_pool(&mut self, node: &RecipeNode, item: &ItemId) -> PoolKey {
        let key = PoolKey::new(node.recipe.id.clone(), item.clone());
        if !self.pool.has_pool(&key) {
            let count = self.flow.facility_count(&node.recipe.id);
            self.pool
                .create_pool(key.clone(), count, node.recipe.output_rate(item));
            self.network.pools.push(PoolInstances {
                recipe: node.recipe.id.clone(),
                item: item.clone(),
                facility: node.facility.id.clone(),
                instances: self.pool.facility_instances(&key).to_vec(),
            });
        }
        key
    }

    /// Allocate each instance's inputs once per recipe, then descend.
    fn expand(&mut self, node: &ProductionNode) {
        let Some(recipe_id) = &node.recipe else {
            return;
        };
        if node.is_cycle_placeholder || self.pool.is_processed(recipe_id) {
            return;
        }
        self.pool.mark_processed(recipe_id.clone());
        let graph = self.graph;
        let Some(recipe_node) = graph.recipe_node(recipe_id) else {
            return;
        };

        let count = self.flow.facility_count(recipe_id);
        let consumers = facility_instances(count, 1.0);
        for instance in &consumers {
            for dep in &node.dependencies {
                let rate = recipe_node.recipe.input_rate(&dep.item) * instance.actual_rate;
                let sink = FlowSink::Instance {
                    recipe: recipe_id.clone(),
                    index: instance.index,
                };
                self.deliver(sink, dep, rate);
            }
        }
        for dep in &node.dependencies {
            self.expand(dep);
        }
    }

    /// Route `rate` of `supplier.item` into `sink`.
    fn deliver(&mut self, sink: FlowSink, supplier: &ProductionNode, rate: f64) {
        if rate <= 0.0 {
            return;
        }
        let item = &supplier.item;
        let graph = self.graph;

        // A loop closure points back at the loop's own production, never at a raw source.
        let producer = if supplier.is_cycle_placeholder {
            match graph.producer_of(item) {
                Some(node) => node,
                None => {
                    let diagnostic = Diagnostic::UnresolvedCycleClosure { item: item.clone() };
                    warn!("{diagnostic}");
                    self.diagnostics.push(diagnostic);
                    return;
                }
            }
        } else if supplier.is_raw {
            self.network.allocations.push(FlowAllocation {
                source: FlowSource::RawMaterial(item.clone()),
                sink,
                item: item.clone(),
                rate,
            });
            return;
        } else {
            match graph.producer_of(item) {
                Some(node) => node,
                None => return,
            }
        };

        let key = self.ensure_pool(producer, item);
        let draws = self.pool.allocate(&key, rate);
        let mut delivered = 0.0;
        for draw in draws {
            delivered += draw.amount;
            self.network.allocations.push(FlowAllocation {
                source: FlowSource::Instance {
                    recipe: key.recipe.clone(),
                    item: item.clone(),
                    index: draw.index,
                },
                sink: sink.clone(),
                item: item.clone(),
                rate: draw.amount,
            });
        }
        let shortfall = rate - delivered;
        if shortfall > COUNT_EPSILON * rate.max(1.0) {
            let diagnostic = Diagnostic::AllocationShortfall {
                recipe: key.recipe,
                item: item.clone(),
                shortfall,
            };
            warn!("{diagnostic}");
            self.diagnostics.push(diagnostic);
        }
    }
}
