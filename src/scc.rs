//! Circular production loops via Tarjan's strongly connected components

use std::collections::{BTreeSet, HashSet};

use slotmap::SecondaryMap;
use tracing::debug;

use crate::graph::{ProductionGraph, Vertex, VertexId};
use crate::models::{ItemId, RecipeId};

/// A maximal set of mutually reachable vertices: one production loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StronglyConnectedComponent {
    /// Sorted member item ids joined with `|`.
    pub id: String,
    /// Member vertices in graph insertion order.
    pub vertices: Vec<VertexId>,
    pub items: Vec<ItemId>,
    pub recipes: Vec<RecipeId>,
    /// Items consumed by the loop's recipes that the loop does not produce.
    pub external_inputs: Vec<ItemId>,
}

impl StronglyConnectedComponent {
    pub fn contains_item(&self, item: &ItemId) -> bool {
        self.items.contains(item)
    }

    pub fn contains_recipe(&self, recipe: &RecipeId) -> bool {
        self.recipes.contains(recipe)
    }
}

/// Identifier of a loop over `items`, independent of discovery order.
pub fn cycle_id<'a>(items: impl IntoIterator<Item = &'a ItemId>) -> String {
    let sorted: BTreeSet<&str> = items.into_iter().map(ItemId::as_str).collect();
    sorted.into_iter().collect::<Vec<_>>().join("|")
}

/// Every non-trivial strongly connected component, ordered by its first vertex.
pub fn find_cycles(graph: &ProductionGraph) -> Vec<StronglyConnectedComponent> {
    let mut tarjan = Tarjan {
        graph,
        index: SecondaryMap::new(),
        lowlink: SecondaryMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for (vertex, _) in graph.vertices() {
        if !tarjan.index.contains_key(vertex) {
            tarjan.strong_connect(vertex);
        }
    }

    let mut components: Vec<Vec<VertexId>> = tarjan
        .components
        .into_iter()
        .filter(|component| component.len() > 1)
        .collect();
    for component in &mut components {
        component.sort();
    }
    components.sort_by_key(|component| component[0]);

    let mut cycles: Vec<StronglyConnectedComponent> = Vec::new();
    for vertices in components {
        let cycle = describe(graph, vertices);
        if cycles.iter().any(|c| c.id == cycle.id) {
            continue;
        }
        debug!(cycle = %cycle.id, recipes = cycle.recipes.len(), "detected production loop");
        cycles.push(cycle);
    }
    cycles
}

fn describe(graph: &ProductionGraph, vertices: Vec<VertexId>) -> StronglyConnectedComponent {
    let mut items = Vec::new();
    let mut recipes = Vec::new();
    for &vertex in &vertices {
        match graph.vertex(vertex) {
            Some(Vertex::Item(node)) => items.push(node.item.clone()),
            Some(Vertex::Recipe(node)) => recipes.push(node.recipe.id.clone()),
            None => {}
        }
    }

    let mut external_inputs: Vec<ItemId> = Vec::new();
    for recipe in &recipes {
        let Some(node) = graph.recipe_node(recipe) else {
            continue;
        };
        for input in &node.inputs {
            if !items.contains(input) && !external_inputs.contains(input) {
                external_inputs.push(input.clone());
            }
        }
    }

    StronglyConnectedComponent {
        id: cycle_id(&items),
        vertices,
        items,
        recipes,
        external_inputs,
    }
}

struct Tarjan<'g> {
    graph: &'g ProductionGraph,
    index: SecondaryMap<VertexId, usize>,
    lowlink: SecondaryMap<VertexId, usize>,
    on_stack: HashSet<VertexId>,
    stack: Vec<VertexId>,
    next_index: usize,
    components: Vec<Vec<VertexId>>,
}

impl Tarjan<'_> {
    /// Walk from `root` with an explicit stack of (vertex, next successor).
    fn strong_connect(&mut self, root: VertexId) {
        let mut work: Vec<(VertexId, usize)> = Vec::new();
        self.visit(root);
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let (v, next) = *frame;
            if let Some(&w) = self.graph.successors(v).get(next) {
                frame.1 += 1;
                if !self.index.contains_key(w) {
                    self.visit(w);
                    work.push((w, 0));
                } else if self.on_stack.contains(&w) {
                    let low = self.lowlink[v].min(self.index[w]);
                    self.lowlink[v] = low;
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                let low = self.lowlink[parent].min(self.lowlink[v]);
                self.lowlink[parent] = low;
            }
            if self.lowlink[v] == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(&w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn visit(&mut self, v: VertexId) {
        self.index.insert(v, self.next_index);
        self.lowlink.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolveOptions;
    use crate::graph::{ItemNode, build_graph};
    use crate::models::Target;
    use crate::test_utils::*;

    #[test]
    fn acyclic_graph_has_no_loops() {
        let catalog = shared_catalog();
        let graph = build_graph(
            &[Target::new("gear", 1.0), Target::new("pipe", 1.0)],
            &catalog,
            &SolveOptions::default(),
        )
        .unwrap();
        assert!(find_cycles(&graph).is_empty());
    }

    #[test]
    fn mutual_dependency_is_one_loop() {
        let catalog = loop_catalog();
        let graph = build_graph(&[Target::new("a", 1.0)], &catalog, &SolveOptions::default())
            .unwrap();
        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].id, "a|b");
        assert_eq!(cycles[0].items, vec![ItemId::from("a"), ItemId::from("b")]);
        assert_eq!(cycles[0].recipes.len(), 2);
        assert!(cycles[0].external_inputs.is_empty());
    }

    #[test]
    fn external_inputs_are_collected() {
        let catalog = fed_loop_catalog();
        let graph = build_graph(&[Target::new("seed", 1.0)], &catalog, &SolveOptions::default())
            .unwrap();
        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].external_inputs, vec![ItemId::from("water")]);
    }

    #[test]
    fn self_feeding_recipe_is_a_loop() {
        let catalog = catalog_of(vec![recipe(
            "breed",
            &[("cell", 1.0), ("food", 1.0)],
            &[("cell", 2.0)],
            1.0,
        )]);
        let graph = build_graph(&[Target::new("cell", 1.0)], &catalog, &SolveOptions::default())
            .unwrap();
        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].id, "cell");
        assert_eq!(cycles[0].external_inputs, vec![ItemId::from("food")]);
    }

    #[test]
    fn identifier_ignores_order() {
        let a = [ItemId::from("b"), ItemId::from("a")];
        let b = [ItemId::from("a"), ItemId::from("b")];
        assert_eq!(cycle_id(&a), cycle_id(&b));
    }

    #[test]
    fn long_loop_does_not_exhaust_the_stack() {
        let mut graph = ProductionGraph::default();
        let vertices: Vec<VertexId> = (0..50_000)
            .map(|i| {
                graph.add_vertex(Vertex::Item(ItemNode {
                    item: ItemId::new(format!("part{i}")),
                    is_raw: false,
                    recipe: None,
                }))
            })
            .collect();
        for pair in vertices.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
        graph.add_edge(vertices[vertices.len() - 1], vertices[0]);

        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].items.len(), vertices.len());
    }

    #[test]
    fn loop_at_the_end_of_a_chain_is_found() {
        let catalog = catalog_of(vec![
            recipe("make-top", &[("a", 1.0)], &[("top", 1.0)], 1.0),
            recipe("make-a", &[("b", 1.0)], &[("a", 2.0)], 1.0),
            recipe("make-b", &[("a", 1.0), ("c", 1.0)], &[("b", 2.0)], 1.0),
            recipe("make-c", &[("ore", 1.0)], &[("c", 1.0)], 1.0),
        ]);
        let graph = build_graph(&[Target::new("top", 1.0)], &catalog, &SolveOptions::default())
            .unwrap();
        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].id, "a|b");
        assert_eq!(cycles[0].external_inputs, vec![ItemId::from("c")]);
    }
}
