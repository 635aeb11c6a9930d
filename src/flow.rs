//! Demand propagation from targets down to raw materials

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{trace, warn};

use crate::condense::CondensedVertex;
use crate::error::Diagnostic;
use crate::graph::{ProductionGraph, RecipeNode, Vertex};
use crate::linalg::{self, LinearSolveError};
use crate::models::{ItemId, RecipeId, Target};
use crate::scc::StronglyConnectedComponent;

/// Solved counts below this magnitude are treated as exactly zero.
const ZERO_TOLERANCE: f64 = 1e-9;

/// Aggregate demand per item and continuous facility count per recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowSolution {
    /// Items per minute drawn on each item by its consumers and the targets.
    /// For loop items this is the draw from outside the loop.
    pub demand: BTreeMap<ItemId, f64>,
    pub facility_counts: BTreeMap<RecipeId, f64>,
}

impl FlowSolution {
    pub fn demand_for(&self, item: &ItemId) -> f64 {
        self.demand.get(item).copied().unwrap_or(0.0)
    }

    pub fn facility_count(&self, recipe: &RecipeId) -> f64 {
        self.facility_counts.get(recipe).copied().unwrap_or(0.0)
    }
}

/// The output driving a recipe's facility count: the fastest output among the
/// items that selected this recipe, first one on ties.
pub fn driver_output(node: &RecipeNode) -> Option<(&ItemId, f64)> {
    let mut best: Option<(&ItemId, f64)> = None;
    for output in &node.recipe.outputs {
        if !node.outputs.contains(&output.item) {
            continue;
        }
        let rate = node.recipe.output_rate(&output.item);
        match best {
            Some((_, r)) if rate <= r => {}
            _ => best = Some((&output.item, rate)),
        }
    }
    best
}

/// Walk the condensed order and turn target rates into facility counts.
pub fn solve_flow(
    graph: &ProductionGraph,
    cycles: &[StronglyConnectedComponent],
    order: &[CondensedVertex],
    targets: &[Target],
    diagnostics: &mut Vec<Diagnostic>,
) -> FlowSolution {
    let mut solution = FlowSolution::default();
    for target in targets {
        *solution.demand.entry(target.item.clone()).or_default() += target.rate;
    }

    for &vertex in order {
        match vertex {
            CondensedVertex::Single(id) => {
                if let Some(Vertex::Recipe(node)) = graph.vertex(id) {
                    solve_recipe(node, &mut solution);
                }
            }
            CondensedVertex::Cycle(idx) => {
                solve_cycle(graph, &cycles[idx], &mut solution, diagnostics);
            }
        }
    }
    solution
}

fn solve_recipe(node: &RecipeNode, solution: &mut FlowSolution) {
    let count = match driver_output(node) {
        Some((item, rate)) if rate > 0.0 => solution.demand_for(item) / rate,
        _ => 0.0,
    };
    trace!(recipe = %node.recipe.id, count, "solved recipe");
    solution
        .facility_counts
        .insert(node.recipe.id.clone(), count);
    add_consumption(node, count, |_| true, solution);
}

fn add_consumption(
    node: &RecipeNode,
    count: f64,
    include: impl Fn(&ItemId) -> bool,
    solution: &mut FlowSolution,
) {
    for input in &node.inputs {
        if include(input) {
            *solution.demand.entry(input.clone()).or_default() +=
                node.recipe.input_rate(input) * count;
        }
    }
}

fn solve_cycle(
    graph: &ProductionGraph,
    cycle: &StronglyConnectedComponent,
    solution: &mut FlowSolution,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let nodes: Vec<&RecipeNode> = cycle
        .recipes
        .iter()
        .filter_map(|recipe| graph.recipe_node(recipe))
        .collect();

    // One row per loop item, then one per outside item that picked a loop recipe.
    let mut rows: Vec<&ItemId> = cycle.items.iter().collect();
    for node in &nodes {
        for item in &node.outputs {
            if !cycle.contains_item(item) && !rows.contains(&item) {
                rows.push(item);
            }
        }
    }

    let matrix: Vec<Vec<f64>> = rows
        .iter()
        .map(|&item| {
            nodes
                .iter()
                .map(|node| node.recipe.output_rate(item) - node.recipe.input_rate(item))
                .collect()
        })
        .collect();
    let external: Vec<f64> = rows.iter().map(|&item| solution.demand_for(item)).collect();

    let solved = if rows.len() == nodes.len() {
        linalg::solve(matrix, external)
    } else {
        report(
            diagnostics,
            Diagnostic::NonSquareCycleSystem {
                cycle: cycle.id.clone(),
                items: rows.len(),
                recipes: nodes.len(),
            },
        );
        linalg::least_squares(&matrix, &external)
            .map(|counts| scale_to_demand(&matrix, &external, counts))
    };

    let counts = match solved {
        Ok(counts) => counts,
        Err(LinearSolveError::Singular) | Err(LinearSolveError::DimensionMismatch { .. }) => {
            report(
                diagnostics,
                Diagnostic::SingularCycleSystem {
                    cycle: cycle.id.clone(),
                },
            );
            vec![0.0; nodes.len()]
        }
    };

    for (node, &raw_count) in nodes.iter().zip(&counts) {
        let count = if raw_count < -ZERO_TOLERANCE {
            report(
                diagnostics,
                Diagnostic::NegativeCycleSolution {
                    cycle: cycle.id.clone(),
                    recipe: node.recipe.id.clone(),
                    value: raw_count,
                },
            );
            0.0
        } else if raw_count.abs() <= ZERO_TOLERANCE {
            0.0
        } else {
            raw_count
        };
        trace!(cycle = %cycle.id, recipe = %node.recipe.id, count, "solved loop recipe");
        solution
            .facility_counts
            .insert(node.recipe.id.clone(), count);
        add_consumption(node, count, |item| !cycle.contains_item(item), solution);
    }
}

/// Scale an approximate solution up until every row with demand is met.
///
/// Least squares trades rows off against each other, which can leave a target
/// short. Growing the whole loop uniformly keeps its internal ratios and turns
/// the error into surplus instead.
fn scale_to_demand(matrix: &[Vec<f64>], demand: &[f64], mut counts: Vec<f64>) -> Vec<f64> {
    let mut factor: f64 = 1.0;
    for (row, &wanted) in matrix.iter().zip(demand) {
        if wanted <= ZERO_TOLERANCE {
            continue;
        }
        let produced: f64 = row
            .iter()
            .zip(&counts)
            .map(|(rate, count)| rate * count.max(0.0))
            .sum();
        if produced > ZERO_TOLERANCE && produced < wanted {
            factor = factor.max(wanted / produced);
        }
    }
    if factor > 1.0 {
        trace!(factor, "scaled loop solution up to meet demand");
        for count in &mut counts {
            *count *= factor;
        }
    }
    counts
}

fn report(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!("{diagnostic}");
    diagnostics.push(diagnostic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::condense::condensed_order;
    use crate::config::SolveOptions;
    use crate::graph::build_graph;
    use crate::scc::find_cycles;
    use crate::test_utils::*;

    fn run(catalog: &Catalog, targets: &[Target]) -> (FlowSolution, Vec<Diagnostic>) {
        let graph = build_graph(targets, catalog, &SolveOptions::default()).unwrap();
        let cycles = find_cycles(&graph);
        let order = condensed_order(&graph, &cycles);
        let mut diagnostics = Vec::new();
        let solution = solve_flow(&graph, &cycles, &order, targets, &mut diagnostics);
        (solution, diagnostics)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn single_recipe_divides_demand() {
        let (solution, diagnostics) = run(&chain_catalog(), &[Target::new("x", 10.0)]);
        assert!(diagnostics.is_empty());
        assert_close(solution.facility_count(&"make-x".into()), 2.0);
        assert_close(solution.demand_for(&"y".into()), 20.0);
    }

    #[test]
    fn shared_intermediate_merges_demand() {
        let (solution, _) = run(
            &shared_catalog(),
            &[Target::new("gear", 30.0), Target::new("pipe", 60.0)],
        );
        // gear: 30/min -> 0.5 facilities -> 60 plate; pipe: 60/min -> 1 facility -> 60 plate.
        assert_close(solution.demand_for(&"plate".into()), 120.0);
        // smelt makes 30 plate/min per facility.
        assert_close(solution.facility_count(&"smelt".into()), 4.0);
        assert_close(solution.demand_for(&"ore".into()), 120.0);
    }

    #[test]
    fn mutual_loop_is_solved_linearly() {
        let (solution, diagnostics) = run(&loop_catalog(), &[Target::new("a", 10.0)]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_close(solution.facility_count(&"make-a".into()), 1.0 / 9.0);
        assert_close(solution.facility_count(&"make-b".into()), 1.0 / 18.0);
    }

    #[test]
    fn loop_external_inputs_are_propagated() {
        let (solution, diagnostics) = run(&fed_loop_catalog(), &[Target::new("seed", 20.0)]);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        // grow: 10 crafts/min, 30 seed out, 10 sprout + 20 water in.
        // plant: 20 crafts/min, 20 seed in, 20 sprout out.
        // 30g - 20p = 20 and 20p - 10g = 0  =>  g = 1, p = 0.5.
        assert_close(solution.facility_count(&"grow".into()), 1.0);
        assert_close(solution.facility_count(&"plant".into()), 0.5);
        assert_close(solution.demand_for(&"water".into()), 20.0);
    }

    #[test]
    fn negative_loop_solution_is_clamped() {
        // b is only ever consumed by the loop while a is drawn from outside,
        // which asks make-b to run backwards.
        let catalog = catalog_of(vec![
            recipe("make-a", &[("b", 1.0)], &[("a", 1.0)], 60.0),
            recipe("make-b", &[("a", 2.0)], &[("b", 1.0)], 60.0),
        ]);
        let targets = [Target::new("a", 1.0), Target::new("b", 5.0)];
        let (solution, diagnostics) = run(&catalog, &targets);
        assert!(solution.facility_counts.values().all(|&c| c >= 0.0));
        assert!(
            diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::NegativeCycleSolution { .. }))
        );
    }

    #[test]
    fn outside_output_of_a_loop_recipe_drives_the_loop() {
        // z is made by a loop recipe but is not part of the loop itself.
        let (solution, diagnostics) = run(&byproduct_loop_catalog(), &[Target::new("z", 10.0)]);
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::NonSquareCycleSystem {
                items: 3,
                recipes: 2,
                ..
            }
        )));
        let refine = solution.facility_count(&"refine".into());
        let recycle = solution.facility_count(&"recycle".into());
        assert!(refine > 0.0 && recycle > 0.0);
        // z at 60/min per refine facility.
        assert!(refine * 60.0 >= 10.0 - 1e-9);
        // Neither loop item runs a deficit.
        assert!(refine * 60.0 - recycle * 60.0 >= -1e-9);
        assert!(recycle * 120.0 - refine * 60.0 >= -1e-9);
    }

    #[test]
    fn scaling_leaves_exact_solutions_alone() {
        let matrix = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 2.0]];
        let counts = scale_to_demand(&matrix, &[1.0, 2.0, 3.0], vec![1.0, 1.0]);
        assert_eq!(counts, vec![1.0, 1.0]);
        let counts = scale_to_demand(&matrix, &[2.0, 0.0, 0.0], vec![1.0, 1.0]);
        assert_eq!(counts, vec![2.0, 2.0]);
    }

    #[test]
    fn driver_ignores_outputs_selected_elsewhere() {
        let catalog = catalog_of(vec![recipe(
            "crack",
            &[("oil", 1.0)],
            &[("tar", 5.0), ("gas", 2.0)],
            1.0,
        )]);
        let graph =
            build_graph(&[Target::new("gas", 1.0)], &catalog, &SolveOptions::default()).unwrap();
        let node = graph.recipe_node(&"crack".into()).unwrap();
        let (item, rate) = driver_output(node).unwrap();
        assert_eq!(item, &ItemId::from("gas"));
        assert_close(rate, 120.0);
    }
}
