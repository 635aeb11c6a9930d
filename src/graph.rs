//! Bipartite item/recipe dependency graph
//!
//! Vertices live in a `SlotMap` arena and edges in a `SecondaryMap`, so the
//! insertion order of the depth-first walk from the targets is also the
//! iteration order of the graph. Everything downstream relies on that for
//! reproducible output.

use std::collections::HashMap;

use slotmap::{SecondaryMap, SlotMap, new_key_type};
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::config::SolveOptions;
use crate::error::PlanError;
use crate::models::{Facility, ItemId, Recipe, RecipeId, Target};

new_key_type! {
    /// Identifies an item or recipe vertex in a [`ProductionGraph`].
    pub struct VertexId;
}

#[derive(Debug, Clone)]
pub struct ItemNode {
    pub item: ItemId,
    /// No recipe selected, either none exists or the item was forced raw.
    pub is_raw: bool,
    pub recipe: Option<VertexId>,
}

#[derive(Debug, Clone)]
pub struct RecipeNode {
    pub recipe: Recipe,
    pub facility: Facility,
    /// Items in the graph that selected this recipe as their producer.
    pub outputs: Vec<ItemId>,
    /// Distinct input items, in recipe order.
    pub inputs: Vec<ItemId>,
}

#[derive(Debug, Clone)]
pub enum Vertex {
    Item(ItemNode),
    Recipe(RecipeNode),
}

impl Vertex {
    pub fn as_item(&self) -> Option<&ItemNode> {
        match self {
            Vertex::Item(node) => Some(node),
            Vertex::Recipe(_) => None,
        }
    }

    pub fn as_recipe(&self) -> Option<&RecipeNode> {
        match self {
            Vertex::Recipe(node) => Some(node),
            Vertex::Item(_) => None,
        }
    }
}

/// Item -> selected recipe -> input items, reachable from the targets.
#[derive(Debug, Clone, Default)]
pub struct ProductionGraph {
    vertices: SlotMap<VertexId, Vertex>,
    edges: SecondaryMap<VertexId, Vec<VertexId>>,
    items: HashMap<ItemId, VertexId>,
    recipes: HashMap<RecipeId, VertexId>,
    targets: Vec<ItemId>,
}

impl ProductionGraph {
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Outgoing edges: an item's selected recipe, or a recipe's input items.
    pub fn successors(&self, id: VertexId) -> &[VertexId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn item_vertex(&self, item: &ItemId) -> Option<VertexId> {
        self.items.get(item).copied()
    }

    pub fn recipe_vertex(&self, recipe: &RecipeId) -> Option<VertexId> {
        self.recipes.get(recipe).copied()
    }

    pub fn item_node(&self, item: &ItemId) -> Option<&ItemNode> {
        self.item_vertex(item)
            .and_then(|v| self.vertices.get(v))
            .and_then(Vertex::as_item)
    }

    pub fn recipe_node(&self, recipe: &RecipeId) -> Option<&RecipeNode> {
        self.recipe_vertex(recipe)
            .and_then(|v| self.vertices.get(v))
            .and_then(Vertex::as_recipe)
    }

    /// The recipe selected to produce `item`, if it is not raw.
    pub fn producer_of(&self, item: &ItemId) -> Option<&RecipeNode> {
        self.item_node(item)
            .and_then(|node| node.recipe)
            .and_then(|v| self.vertices.get(v))
            .and_then(Vertex::as_recipe)
    }

    pub fn is_raw(&self, item: &ItemId) -> bool {
        self.item_node(item).is_some_and(|node| node.is_raw)
    }

    pub fn targets(&self) -> &[ItemId] {
        &self.targets
    }

    /// Item nodes in insertion order.
    pub fn item_nodes(&self) -> impl Iterator<Item = &ItemNode> {
        self.vertices.values().filter_map(Vertex::as_item)
    }

    /// Recipe nodes in insertion order.
    pub fn recipe_nodes(&self) -> impl Iterator<Item = &RecipeNode> {
        self.vertices.values().filter_map(Vertex::as_recipe)
    }

    pub(crate) fn add_edge(&mut self, from: VertexId, to: VertexId) {
        if let Some(list) = self.edges.get_mut(from) {
            if !list.contains(&to) {
                list.push(to);
            }
        }
    }

    pub(crate) fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        let id = self.vertices.insert(vertex);
        self.edges.insert(id, Vec::new());
        id
    }
}

/// Walk the catalog from each target and record the recipe chosen for every item.
pub fn build_graph(
    targets: &[Target],
    catalog: &Catalog,
    options: &SolveOptions,
) -> Result<ProductionGraph, PlanError> {
    let mut builder = GraphBuilder {
        catalog,
        options,
        graph: ProductionGraph::default(),
    };
    for target in targets {
        builder.visit(&target.item, Vec::new())?;
        if !builder.graph.targets.contains(&target.item) {
            builder.graph.targets.push(target.item.clone());
        }
    }
    debug!(
        vertices = builder.graph.vertex_count(),
        items = builder.graph.items.len(),
        recipes = builder.graph.recipes.len(),
        "built production graph"
    );
    Ok(builder.graph)
}

struct GraphBuilder<'a> {
    catalog: &'a Catalog,
    options: &'a SolveOptions,
    graph: ProductionGraph,
}

impl<'a> GraphBuilder<'a> {
    fn visit(&mut self, item: &ItemId, mut path: Vec<ItemId>) -> Result<VertexId, PlanError> {
        if let Some(existing) = self.graph.item_vertex(item) {
            return Ok(existing);
        }
        self.catalog.item(item)?;

        let item_vertex = self.graph.add_vertex(Vertex::Item(ItemNode {
            item: item.clone(),
            is_raw: false,
            recipe: None,
        }));
        self.graph.items.insert(item.clone(), item_vertex);
        path.push(item.clone());

        let Some(recipe) = self.select_recipe(item, &path)? else {
            trace!(%item, "raw material");
            if let Some(Vertex::Item(node)) = self.graph.vertices.get_mut(item_vertex) {
                node.is_raw = true;
            }
            return Ok(item_vertex);
        };

        match self.graph.recipe_vertex(&recipe.id) {
            Some(existing) => {
                if let Some(Vertex::Recipe(node)) = self.graph.vertices.get_mut(existing) {
                    node.outputs.push(item.clone());
                }
                self.link(item_vertex, existing);
            }
            None => {
                self.catalog.validate_recipe(recipe)?;
                let facility = self.catalog.facility_for(recipe)?.clone();
                let mut inputs: Vec<ItemId> = Vec::new();
                for input in &recipe.inputs {
                    if !inputs.contains(&input.item) {
                        inputs.push(input.item.clone());
                    }
                }
                let vertex = self.graph.add_vertex(Vertex::Recipe(RecipeNode {
                    recipe: recipe.clone(),
                    facility,
                    outputs: vec![item.clone()],
                    inputs: inputs.clone(),
                }));
                self.graph.recipes.insert(recipe.id.clone(), vertex);
                self.link(item_vertex, vertex);
                trace!(%item, recipe = %recipe.id, "selected recipe");

                for input in &inputs {
                    let child = self.visit(input, path.clone())?;
                    self.graph.add_edge(vertex, child);
                }
            }
        }
        Ok(item_vertex)
    }

    fn link(&mut self, item_vertex: VertexId, recipe_vertex: VertexId) {
        if let Some(Vertex::Item(node)) = self.graph.vertices.get_mut(item_vertex) {
            node.recipe = Some(recipe_vertex);
        }
        self.graph.add_edge(item_vertex, recipe_vertex);
    }

    fn select_recipe(
        &self,
        item: &ItemId,
        path: &[ItemId],
    ) -> Result<Option<&'a Recipe>, PlanError> {
        let catalog: &'a Catalog = self.catalog;
        if self.options.raw_materials.contains(item) {
            return Ok(None);
        }
        if let Some(recipe_id) = self.options.recipe_overrides.get(item) {
            let recipe = catalog.find_recipe(recipe_id).ok_or_else(|| {
                PlanError::MissingOverrideRecipe {
                    item: item.clone(),
                    recipe: recipe_id.clone(),
                }
            })?;
            if !recipe.produces(item) {
                return Err(PlanError::OverrideDoesNotProduce {
                    item: item.clone(),
                    recipe: recipe_id.clone(),
                });
            }
            return Ok(Some(recipe));
        }
        let candidates = catalog.producers_of(item);
        if candidates.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.options.selector.select(item, &candidates, path)))
    }
}
