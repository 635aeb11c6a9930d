//! Production trees rooted at each target, and loop summaries for consumers

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::flow::{FlowSolution, driver_output};
use crate::graph::ProductionGraph;
use crate::models::{DetectedCycle, ItemId, ProductionNode, RecipeId, Target};
use crate::scc::StronglyConnectedComponent;

/// One tree per target.
///
/// Outside loops, edge rates are local parent/child ratios. A loop is entered
/// with this position's share of the loop's outside demand, and every loop
/// recipe below it runs that share of its solved count, recirculation
/// included. An item repeated on the current path, or one whose recipe
/// already runs on it, becomes a cycle placeholder instead of recursing.
pub fn assemble_trees(
    graph: &ProductionGraph,
    cycles: &[StronglyConnectedComponent],
    flow: &FlowSolution,
    targets: &[Target],
) -> Vec<ProductionNode> {
    let mut membership: HashMap<&RecipeId, usize> = HashMap::new();
    for (idx, cycle) in cycles.iter().enumerate() {
        for recipe in &cycle.recipes {
            membership.insert(recipe, idx);
        }
    }
    let assembler = TreeAssembler {
        graph,
        flow,
        membership,
    };
    targets
        .iter()
        .map(|target| {
            let mut root = assembler.build_node(&target.item, target.rate, Trail::default());
            root.is_target = true;
            root
        })
        .collect()
}

/// What lies above a node on its way to the target. Copied on descent.
#[derive(Debug, Clone, Default)]
struct Trail {
    items: Vec<ItemId>,
    recipes: Vec<RecipeId>,
    /// The loop being walked and this branch's share of its solved counts.
    loop_share: Option<(usize, f64)>,
}

struct TreeAssembler<'a> {
    graph: &'a ProductionGraph,
    flow: &'a FlowSolution,
    membership: HashMap<&'a RecipeId, usize>,
}

impl TreeAssembler<'_> {
    fn build_node(&self, item: &ItemId, rate: f64, mut trail: Trail) -> ProductionNode {
        if trail.items.contains(item) {
            return ProductionNode::cycle_placeholder(item.clone(), rate);
        }
        let Some(producer) = self.graph.producer_of(item) else {
            return ProductionNode::raw(item.clone(), rate);
        };
        if trail.recipes.contains(&producer.recipe.id) {
            return ProductionNode::cycle_placeholder(item.clone(), rate);
        }

        let facility_count = match self.membership.get(&producer.recipe.id) {
            Some(&cycle) => {
                let share = match trail.loop_share {
                    Some((current, share)) if current == cycle => share,
                    _ => {
                        let outside = self.flow.demand_for(item);
                        if outside > 0.0 { rate / outside } else { 0.0 }
                    }
                };
                trail.loop_share = Some((cycle, share));
                self.flow.facility_count(&producer.recipe.id) * share
            }
            None => {
                trail.loop_share = None;
                let per_facility = producer.recipe.output_rate(item);
                if per_facility > 0.0 {
                    rate / per_facility
                } else {
                    0.0
                }
            }
        };
        trail.items.push(item.clone());
        trail.recipes.push(producer.recipe.id.clone());

        let dependencies = producer
            .inputs
            .iter()
            .map(|input| {
                let input_rate = producer.recipe.input_rate(input) * facility_count;
                self.build_node(input, input_rate, trail.clone())
            })
            .collect();

        ProductionNode {
            item: item.clone(),
            recipe: Some(producer.recipe.id.clone()),
            facility: Some(producer.facility.id.clone()),
            facility_count,
            rate,
            power: producer.facility.power * facility_count,
            dependencies,
            is_raw: false,
            is_target: false,
            is_cycle_placeholder: false,
        }
    }
}

/// Describe each loop with its solved recipes, break point and net output.
pub fn describe_cycles(
    graph: &ProductionGraph,
    cycles: &[StronglyConnectedComponent],
    flow: &FlowSolution,
    trees: &[ProductionNode],
) -> Vec<DetectedCycle> {
    cycles
        .iter()
        .map(|cycle| {
            let break_point = break_point(cycle, trees);
            let mut nodes = Vec::new();
            let mut net_output: BTreeMap<ItemId, f64> =
                cycle.items.iter().map(|item| (item.clone(), 0.0)).collect();
            let mut external_inputs: BTreeMap<ItemId, f64> = BTreeMap::new();

            for recipe_id in &cycle.recipes {
                let Some(producer) = graph.recipe_node(recipe_id) else {
                    continue;
                };
                let recipe = &producer.recipe;
                let count = flow.facility_count(recipe_id);

                for output in &recipe.outputs {
                    if let Some(net) = net_output.get_mut(&output.item) {
                        *net += output.amount;
                    }
                }
                for input in &recipe.inputs {
                    if let Some(net) = net_output.get_mut(&input.item) {
                        *net -= input.amount;
                    }
                }

                let mut dependencies = Vec::new();
                for input in &producer.inputs {
                    let rate = recipe.input_rate(input) * count;
                    if cycle.contains_item(input) {
                        dependencies.push(ProductionNode::cycle_placeholder(input.clone(), rate));
                    } else {
                        *external_inputs.entry(input.clone()).or_default() += rate;
                    }
                }

                let (item, per_facility) = match driver_output(producer) {
                    Some((item, rate)) => (item.clone(), rate),
                    None => (producer.outputs[0].clone(), 0.0),
                };
                nodes.push(ProductionNode {
                    item,
                    recipe: Some(recipe_id.clone()),
                    facility: Some(producer.facility.id.clone()),
                    facility_count: count,
                    rate: per_facility * count,
                    power: producer.facility.power * count,
                    dependencies,
                    is_raw: false,
                    is_target: false,
                    is_cycle_placeholder: false,
                });
            }

            debug!(cycle = %cycle.id, break_point = %break_point, "described loop");
            DetectedCycle {
                id: cycle.id.clone(),
                items: cycle.items.clone(),
                break_point,
                nodes,
                net_output,
                external_inputs,
            }
        })
        .collect()
}

/// The first loop item the trees had to close with a placeholder.
fn break_point(cycle: &StronglyConnectedComponent, trees: &[ProductionNode]) -> ItemId {
    let mut found: Option<ItemId> = None;
    for tree in trees {
        tree.walk(&mut |node: &ProductionNode| {
            if found.is_none() && node.is_cycle_placeholder && cycle.contains_item(&node.item) {
                found = Some(node.item.clone());
            }
        });
        if found.is_some() {
            break;
        }
    }
    found.unwrap_or_else(|| cycle.items[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::condense::condensed_order;
    use crate::config::SolveOptions;
    use crate::flow::solve_flow;
    use crate::graph::build_graph;
    use crate::scc::find_cycles;
    use crate::test_utils::*;

    fn solved(
        catalog: &Catalog,
        targets: &[Target],
    ) -> (ProductionGraph, Vec<StronglyConnectedComponent>, FlowSolution) {
        let graph = build_graph(targets, catalog, &SolveOptions::default()).unwrap();
        let cycles = find_cycles(&graph);
        let order = condensed_order(&graph, &cycles);
        let mut diagnostics = Vec::new();
        let flow = solve_flow(&graph, &cycles, &order, targets, &mut diagnostics);
        (graph, cycles, flow)
    }

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-9
    }

    #[test]
    fn chain_tree_has_local_rates() {
        let catalog = chain_catalog();
        let targets = [Target::new("x", 10.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);

        assert_eq!(trees.len(), 1);
        let root = &trees[0];
        assert!(root.is_target);
        assert_eq!(root.recipe, Some(RecipeId::from("make-x")));
        assert!((root.facility_count - 2.0).abs() < 1e-12);
        assert!((root.power - 2.0 * ASSEMBLER_POWER).abs() < 1e-9);
        assert_eq!(root.dependencies.len(), 1);
        let y = &root.dependencies[0];
        assert!(y.is_raw && y.is_leaf());
        assert!((y.rate - 20.0).abs() < 1e-12);
    }

    #[test]
    fn loop_closes_with_placeholder() {
        let catalog = loop_catalog();
        let targets = [Target::new("a", 10.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);

        let b = &trees[0].dependencies[0];
        assert_eq!(b.item, ItemId::from("b"));
        let closure = &b.dependencies[0];
        assert!(closure.is_cycle_placeholder);
        assert!(!closure.is_raw);
        assert_eq!(closure.item, ItemId::from("a"));
        assert!(closure.is_leaf());
    }

    #[test]
    fn cycles_report_break_point_and_net_output() {
        let catalog = fed_loop_catalog();
        let targets = [Target::new("seed", 20.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);
        let detected = describe_cycles(&graph, &cycles, &flow, &trees);

        assert_eq!(detected.len(), 1);
        let cycle = &detected[0];
        assert_eq!(cycle.id, "seed|sprout");
        assert_eq!(cycle.break_point, ItemId::from("seed"));
        assert_eq!(cycle.nodes.len(), 2);
        // grow: +3 seed -1 sprout; plant: -1 seed +1 sprout.
        assert_eq!(cycle.net_output[&ItemId::from("seed")], 2.0);
        assert_eq!(cycle.net_output[&ItemId::from("sprout")], 0.0);
        assert!((cycle.external_inputs[&ItemId::from("water")] - 20.0).abs() < 1e-9);
        let grow = &cycle.nodes[0];
        assert_eq!(grow.recipe, Some(RecipeId::from("grow")));
        assert!(grow.dependencies.iter().all(|d| d.is_cycle_placeholder));
    }

    #[test]
    fn loop_nodes_run_the_solved_counts() {
        let catalog = loop_catalog();
        let targets = [Target::new("a", 10.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);

        let make_a = &trees[0];
        let make_b = &make_a.dependencies[0];
        assert!(close(make_a.facility_count, 1.0 / 9.0));
        assert!(close(make_b.facility_count, 1.0 / 18.0));
        assert!(close(make_a.facility_count, flow.facility_count(&"make-a".into())));
        assert!(close(make_b.facility_count, flow.facility_count(&"make-b".into())));
        // The closure carries what make-b consumes, recirculation included.
        assert!(close(make_b.dependencies[0].rate, 60.0 / 18.0));
    }

    #[test]
    fn targets_split_a_shared_loop_by_demand() {
        let catalog = shared_loop_catalog();
        let targets = [Target::new("seed", 20.0), Target::new("bread", 15.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);

        let direct = &trees[0];
        let baked = &trees[1].dependencies[0];
        assert_eq!(baked.recipe, Some(RecipeId::from("grow")));
        assert!(close(direct.facility_count, 1.0));
        assert!(close(baked.facility_count, 1.5));
        assert!(close(
            direct.facility_count + baked.facility_count,
            flow.facility_count(&"grow".into())
        ));
        let plant = &baked.dependencies[0];
        assert!(close(plant.facility_count, 0.75));
    }

    #[test]
    fn recipe_already_on_the_path_closes_the_tree() {
        let catalog = byproduct_loop_catalog();
        let targets = [Target::new("z", 10.0)];
        let (graph, cycles, flow) = solved(&catalog, &targets);
        let trees = assemble_trees(&graph, &cycles, &flow, &targets);

        let refine = &trees[0];
        assert_eq!(refine.recipe, Some(RecipeId::from("refine")));
        let recycle = &refine.dependencies[0];
        let closure = &recycle.dependencies[0];
        assert_eq!(closure.item, ItemId::from("a"));
        assert!(closure.is_cycle_placeholder);
        assert!(close(recycle.facility_count, flow.facility_count(&"recycle".into())));
    }
}
