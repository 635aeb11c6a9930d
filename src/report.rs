//! Human-readable rendering of solved plans

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::catalog::Catalog;
use crate::error::Diagnostic;
use crate::models::{DetectedCycle, FlowSource, ItemId, ProductionNode};
use crate::solver::SolveResult;

/// Total power of every facility in a production tree.
///
/// Loop closures carry no facilities, so each tree counts a loop's
/// recipes once along its own path.
pub fn total_power(node: &ProductionNode) -> f64 {
    let mut total = 0.0;
    node.walk(&mut |n: &ProductionNode| total += n.power);
    total
}

/// Format a production tree as an indented outline.
pub fn format_production_tree(node: &ProductionNode, indent: usize) -> String {
    let mut output = String::new();
    write_node(&mut output, node, indent);
    output
}

fn write_node(output: &mut String, node: &ProductionNode, indent: usize) {
    let prefix = "  ".repeat(indent);
    if node.is_cycle_placeholder {
        let _ = writeln!(output, "{prefix}<- {} @ {:.3}/min (loop)", node.item, node.rate);
        return;
    }
    if node.is_raw {
        let _ = writeln!(output, "{prefix}-> {} @ {:.3}/min (raw input)", node.item, node.rate);
        return;
    }

    let facility = node
        .facility
        .as_ref()
        .map_or("?", |facility| facility.as_str());
    let recipe = node.recipe.as_ref().map_or("?", |recipe| recipe.as_str());
    let marker = if node.is_target { " [target]" } else { "" };
    let _ = writeln!(
        output,
        "{prefix}{} @ {:.3}/min: {:.2}x {} running {} ({:.0} power){marker}",
        node.item, node.rate, node.facility_count, facility, recipe, node.power
    );
    for dep in &node.dependencies {
        write_node(output, dep, indent + 1);
    }
}

/// Format one loop with its recipes and net output.
pub fn format_cycle(cycle: &DetectedCycle) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Loop {} (break at {})", cycle.id, cycle.break_point);
    for node in &cycle.nodes {
        let recipe = node.recipe.as_ref().map_or("?", |recipe| recipe.as_str());
        let _ = writeln!(
            output,
            "  {:.3}x {} -> {} @ {:.3}/min",
            node.facility_count, recipe, node.item, node.rate
        );
    }
    for (item, net) in &cycle.net_output {
        let _ = writeln!(output, "  net {item}: {net:+.3} per cycle");
    }
    for (item, rate) in &cycle.external_inputs {
        let _ = writeln!(output, "  feeds on {item} @ {rate:.3}/min");
    }
    output
}

/// One line of facility totals.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityLine {
    pub recipe: String,
    pub facility: String,
    pub count: f64,
    pub instances: usize,
    pub power: f64,
}

/// Summary of a solved plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub targets: Vec<(String, f64)>,
    pub facilities: Vec<FacilityLine>,
    /// Raw material draw, lowest tier first.
    pub raw_inputs: Vec<(String, f64)>,
    pub total_power: f64,
    pub loops: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanSummary {
    pub fn new(result: &SolveResult, catalog: &Catalog) -> Self {
        let item_name = |id: &ItemId| {
            catalog
                .item(id)
                .map_or_else(|_| id.to_string(), |item| item.display_name().to_string())
        };

        let targets = result
            .trees
            .iter()
            .filter(|tree| tree.is_target)
            .map(|tree| (item_name(&tree.item), tree.rate))
            .collect();

        let mut facilities = Vec::new();
        let mut total_power = 0.0;
        for (recipe_id, &count) in &result.flow.facility_counts {
            if count <= 0.0 {
                continue;
            }
            let facility = catalog
                .find_recipe(recipe_id)
                .and_then(|recipe| catalog.facility_for(recipe).ok());
            let power = facility.map_or(0.0, |f| f.power * count);
            total_power += power;
            let instances = result
                .network
                .pools
                .iter()
                .filter(|pool| &pool.recipe == recipe_id)
                .map(|pool| pool.instances.len())
                .max()
                .unwrap_or(0);
            facilities.push(FacilityLine {
                recipe: recipe_id.to_string(),
                facility: facility
                    .map_or_else(|| "?".to_string(), |f| f.display_name().to_string()),
                count,
                instances,
                power,
            });
        }

        let mut raw_totals: BTreeMap<ItemId, f64> = BTreeMap::new();
        for allocation in &result.network.allocations {
            if let FlowSource::RawMaterial(item) = &allocation.source {
                *raw_totals.entry(item.clone()).or_default() += allocation.rate;
            }
        }
        let mut raw: Vec<(i32, ItemId, f64)> = raw_totals
            .into_iter()
            .map(|(item, rate)| {
                let tier = catalog.item(&item).map_or(0, |i| i.tier);
                (tier, item, rate)
            })
            .collect();
        raw.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let raw_inputs = raw
            .into_iter()
            .map(|(_, item, rate)| (item_name(&item), rate))
            .collect();

        Self {
            targets,
            facilities,
            raw_inputs,
            total_power,
            loops: result.detected_cycles.iter().map(|c| c.id.clone()).collect(),
            diagnostics: result.diagnostics.clone(),
        }
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Production Summary ===")?;
        for (name, rate) in &self.targets {
            writeln!(f, "Target: {} @ {:.3}/min", name, rate)?;
        }
        writeln!(f)?;

        writeln!(f, "Facilities required:")?;
        for line in &self.facilities {
            writeln!(
                f,
                "  {:.2}x {} ({} units) for {}",
                line.count, line.facility, line.instances, line.recipe
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Raw inputs required:")?;
        for (name, rate) in &self.raw_inputs {
            writeln!(f, "  {} @ {:.3}/min", name, rate)?;
        }
        writeln!(f)?;

        if !self.loops.is_empty() {
            writeln!(f, "Loops:")?;
            for id in &self.loops {
                writeln!(f, "  {}", id)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Power: {:.0}", self.total_power)?;

        if !self.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings (plan may be approximate):")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "  {}", diagnostic)?;
            }
        }
        Ok(())
    }
}
