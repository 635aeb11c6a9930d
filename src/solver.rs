//! Solve entry point: targets in, production trees and loops out

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::condense::condensed_order;
use crate::config::SolveOptions;
use crate::error::{Diagnostic, PlanError};
use crate::flow::{FlowSolution, solve_flow};
use crate::graph::build_graph;
use crate::models::{DetectedCycle, ProductionNode, Target};
use crate::pool::{FlowNetwork, materialize};
use crate::scc::find_cycles;
use crate::tree::{assemble_trees, describe_cycles};

/// Everything one solve produces. Read-only for consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveResult {
    pub trees: Vec<ProductionNode>,
    pub detected_cycles: Vec<DetectedCycle>,
    pub flow: FlowSolution,
    pub network: FlowNetwork,
    pub diagnostics: Vec<Diagnostic>,
}

impl SolveResult {
    /// A non-empty diagnostics list means the plan may be approximate.
    pub fn is_approximate(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Compute a steady-state plan for `targets` from scratch.
///
/// Each call builds its own graph, flow maps and pools; nothing is shared
/// between calls except the read-only catalog.
pub fn solve(
    targets: &[Target],
    catalog: &Catalog,
    options: &SolveOptions,
) -> Result<SolveResult, PlanError> {
    validate_targets(targets)?;
    info!(targets = targets.len(), "solving production plan");

    let graph = build_graph(targets, catalog, options)?;
    let cycles = find_cycles(&graph);
    let order = condensed_order(&graph, &cycles);

    let mut diagnostics = Vec::new();
    let flow = solve_flow(&graph, &cycles, &order, targets, &mut diagnostics);
    debug!(recipes = flow.facility_counts.len(), "solved demand flow");

    let trees = assemble_trees(&graph, &cycles, &flow, targets);
    let detected_cycles = describe_cycles(&graph, &cycles, &flow, &trees);
    let network = materialize(&graph, &flow, &trees, &mut diagnostics);

    info!(
        recipes = flow.facility_counts.len(),
        loops = detected_cycles.len(),
        diagnostics = diagnostics.len(),
        "solved production plan"
    );
    Ok(SolveResult {
        trees,
        detected_cycles,
        flow,
        network,
        diagnostics,
    })
}

fn validate_targets(targets: &[Target]) -> Result<(), PlanError> {
    if targets.is_empty() {
        return Err(PlanError::EmptyTargets);
    }
    for target in targets {
        if !(target.rate > 0.0) || !target.rate.is_finite() {
            return Err(PlanError::InvalidTargetRate {
                item: target.item.clone(),
                rate: target.rate,
            });
        }
    }
    Ok(())
}
