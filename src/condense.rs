//! Collapse loops into composite vertices and order the result for demand propagation

use std::collections::{HashMap, VecDeque};

use slotmap::SecondaryMap;
use tracing::debug;

use crate::graph::{ProductionGraph, VertexId};
use crate::scc::StronglyConnectedComponent;

/// A vertex of the condensed, acyclic graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondensedVertex {
    /// An item or recipe outside every loop.
    Single(VertexId),
    /// Index into the loop list the condensation was built from.
    Cycle(usize),
}

/// Condensed vertices ordered consumers first, raw materials last.
///
/// Edges run from a dependency to its dependent, Kahn's algorithm orders them
/// producers first, and the result is reversed. Ties are broken by graph
/// insertion order.
pub fn condensed_order(
    graph: &ProductionGraph,
    cycles: &[StronglyConnectedComponent],
) -> Vec<CondensedVertex> {
    let mut membership: SecondaryMap<VertexId, usize> = SecondaryMap::new();
    for (idx, cycle) in cycles.iter().enumerate() {
        for &vertex in &cycle.vertices {
            membership.insert(vertex, idx);
        }
    }
    let condense = |vertex: VertexId| match membership.get(vertex) {
        Some(&idx) => CondensedVertex::Cycle(idx),
        None => CondensedVertex::Single(vertex),
    };

    // Condensed vertices in first-seen order; slot indices follow this order.
    let mut nodes: Vec<CondensedVertex> = Vec::new();
    let mut position: HashMap<CondensedVertex, usize> = HashMap::new();
    for (vertex, _) in graph.vertices() {
        let cv = condense(vertex);
        if !position.contains_key(&cv) {
            position.insert(cv, nodes.len());
            nodes.push(cv);
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for (vertex, _) in graph.vertices() {
        let dependent = position[&condense(vertex)];
        for &dep in graph.successors(vertex) {
            let dependency = position[&condense(dep)];
            if dependency == dependent || dependents[dependency].contains(&dependent) {
                continue;
            }
            dependents[dependency].push(dependent);
            in_degree[dependent] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&n| in_degree[n] == 0).collect();
    let mut order: Vec<CondensedVertex> = Vec::with_capacity(nodes.len());
    while let Some(n) = queue.pop_front() {
        order.push(nodes[n]);
        for &dependent in &dependents[n] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }
    debug_assert_eq!(order.len(), nodes.len(), "condensed graph must be acyclic");

    order.reverse();
    debug!(vertices = order.len(), loops = cycles.len(), "sequenced condensed graph");
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolveOptions;
    use crate::graph::{Vertex, build_graph};
    use crate::models::Target;
    use crate::scc::find_cycles;
    use crate::test_utils::*;

    fn position_of(order: &[CondensedVertex], cv: CondensedVertex) -> usize {
        order.iter().position(|&o| o == cv).unwrap()
    }

    #[test]
    fn consumers_come_before_producers() {
        let catalog = shared_catalog();
        let graph = build_graph(
            &[Target::new("gear", 1.0), Target::new("pipe", 1.0)],
            &catalog,
            &SolveOptions::default(),
        )
        .unwrap();
        let order = condensed_order(&graph, &[]);
        assert_eq!(order.len(), graph.vertex_count());

        let at = |vertex| position_of(&order, CondensedVertex::Single(vertex));
        let gear = graph.recipe_vertex(&"make-gear".into()).unwrap();
        let pipe = graph.recipe_vertex(&"make-pipe".into()).unwrap();
        let plate = graph.item_vertex(&"plate".into()).unwrap();
        let smelt = graph.recipe_vertex(&"smelt".into()).unwrap();
        let ore = graph.item_vertex(&"ore".into()).unwrap();
        assert!(at(gear) < at(plate));
        assert!(at(pipe) < at(plate));
        assert!(at(plate) < at(smelt));
        assert!(at(smelt) < at(ore));
    }

    #[test]
    fn loop_collapses_to_one_vertex() {
        let catalog = fed_loop_catalog();
        let graph = build_graph(&[Target::new("seed", 1.0)], &catalog, &SolveOptions::default())
            .unwrap();
        let cycles = find_cycles(&graph);
        let order = condensed_order(&graph, &cycles);

        // seed, grow, sprout and plant collapse; water stays.
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], CondensedVertex::Cycle(0));
        let water = graph.item_vertex(&"water".into()).unwrap();
        assert_eq!(order[1], CondensedVertex::Single(water));
    }

    #[test]
    fn order_is_reproducible() {
        let catalog = shared_catalog();
        let targets = [Target::new("pipe", 3.0), Target::new("gear", 1.0)];
        let a = build_graph(&targets, &catalog, &SolveOptions::default()).unwrap();
        let b = build_graph(&targets, &catalog, &SolveOptions::default()).unwrap();
        let describe = |graph: &ProductionGraph| -> Vec<String> {
            condensed_order(graph, &[])
                .into_iter()
                .filter_map(|cv| match cv {
                    CondensedVertex::Single(v) => graph.vertex(v),
                    CondensedVertex::Cycle(_) => None,
                })
                .map(|vertex| match vertex {
                    Vertex::Item(node) => node.item.to_string(),
                    Vertex::Recipe(node) => node.recipe.id.to_string(),
                })
                .collect()
        };
        assert_eq!(describe(&a), describe(&b));
    }
}
