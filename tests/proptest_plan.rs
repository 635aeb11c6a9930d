//! Property-based tests for the planner.
//!
//! Generates random recipe chains and diamonds, then checks the structural
//! guarantees every solved plan must hold.

use production_planner::test_utils::*;
use production_planner::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// (input amount, output amount, duration) of one recipe step.
fn arb_step() -> impl Strategy<Value = (f64, f64, f64)> {
    (1u32..=8, 1u32..=5, 1u32..=40).prop_map(|(input, output, duration)| {
        (input as f64 / 2.0, output as f64, duration as f64 / 4.0)
    })
}

/// A chain `item0 <- item1 <- ... <- itemN`, itemN being raw.
fn arb_chain(max_len: usize) -> impl Strategy<Value = Catalog> {
    proptest::collection::vec(arb_step(), 1..=max_len).prop_map(|steps| {
        let recipes = steps
            .iter()
            .enumerate()
            .map(|(i, &(input, output, duration))| {
                let made = format!("item{i}");
                let used = format!("item{}", i + 1);
                recipe(
                    &format!("make-{made}"),
                    &[(used.as_str(), input)],
                    &[(made.as_str(), output)],
                    duration,
                )
            })
            .collect();
        catalog_of(recipes)
    })
}

/// `top <- left + right`, both sides built from a shared `base <- ore`.
fn arb_diamond() -> impl Strategy<Value = Catalog> {
    (arb_step(), arb_step(), arb_step(), arb_step()).prop_map(|(top, left, right, base)| {
        catalog_of(vec![
            recipe(
                "make-top",
                &[("left", top.0), ("right", top.0 + 1.0)],
                &[("top", top.1)],
                top.2,
            ),
            recipe("make-left", &[("base", left.0)], &[("left", left.1)], left.2),
            recipe("make-right", &[("base", right.0)], &[("right", right.1)], right.2),
            recipe("make-base", &[("ore", base.0)], &[("base", base.1)], base.2),
        ])
    })
}

fn arb_rate() -> impl Strategy<Value = f64> {
    (1u32..=4000).prop_map(|r| r as f64 / 8.0)
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0)
}

fn check_plan(result: &SolveResult, catalog: &Catalog, targets: &[Target]) {
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.detected_cycles.is_empty());

    for count in result.flow.facility_counts.values() {
        assert!(*count >= 0.0);
    }

    for tree in &result.trees {
        tree.walk(&mut |node: &ProductionNode| {
            assert!(node.rate >= 0.0 && node.facility_count >= 0.0);
            if node.is_leaf() {
                assert!(node.is_raw);
            }
            if let Some(recipe_id) = &node.recipe {
                let recipe = catalog.recipe(recipe_id).unwrap();
                assert!(close(
                    node.rate,
                    recipe.output_rate(&node.item) * node.facility_count
                ));
                for dep in &node.dependencies {
                    assert!(close(
                        dep.rate,
                        recipe.input_rate(&dep.item) * node.facility_count
                    ));
                }
            }
        });
    }

    for pool in &result.network.pools {
        for instance in &pool.instances {
            let used = result
                .network
                .allocated_from(&pool.recipe, &pool.item, instance.index);
            assert!(used <= instance.actual_rate + 1e-9);
            assert!(instance.actual_rate <= instance.max_rate + 1e-9);
        }
    }

    for target in targets {
        let delivered = result
            .network
            .delivered_to(&FlowSink::Target(target.item.clone()), &target.item);
        assert!(close(delivered, target.rate), "{delivered} != {}", target.rate);
    }
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Chains conserve mass at every step and deliver the full target rate.
    #[test]
    fn chains_conserve_mass(catalog in arb_chain(6), rate in arb_rate()) {
        let targets = [Target::new("item0", rate)];
        let result = solve(&targets, &catalog, &SolveOptions::default()).unwrap();
        check_plan(&result, &catalog, &targets);
    }

    /// Shared intermediates are pooled once and never oversubscribed.
    #[test]
    fn diamonds_share_one_pool(catalog in arb_diamond(), rate in arb_rate()) {
        let targets = [Target::new("top", rate)];
        let result = solve(&targets, &catalog, &SolveOptions::default()).unwrap();
        check_plan(&result, &catalog, &targets);

        let base_pools = result
            .network
            .pools
            .iter()
            .filter(|p| p.item == ItemId::from("base"))
            .count();
        prop_assert_eq!(base_pools, 1);

        let left = result.flow.demand_for(&"left".into());
        let right = result.flow.demand_for(&"right".into());
        let base = catalog.recipe(&"make-left".into()).unwrap();
        let other = catalog.recipe(&"make-right".into()).unwrap();
        let expected = left / base.output_rate(&"left".into()) * base.input_rate(&"base".into())
            + right / other.output_rate(&"right".into()) * other.input_rate(&"base".into());
        prop_assert!(close(result.flow.demand_for(&"base".into()), expected));
    }

    /// Solving is a pure function of its inputs.
    #[test]
    fn solving_is_idempotent(catalog in arb_chain(4), rate in arb_rate()) {
        let targets = [Target::new("item0", rate)];
        let first = solve(&targets, &catalog, &SolveOptions::default()).unwrap();
        let second = solve(&targets, &catalog, &SolveOptions::default()).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Instances split a count into whole units plus one partial unit.
    #[test]
    fn instances_cover_the_count(count in 0u32..400, full_rate in 1u32..100) {
        let count = count as f64 / 16.0;
        let full_rate = full_rate as f64;
        let instances = production_planner::pool::facility_instances(count, full_rate);

        prop_assert_eq!(instances.len(), count.ceil() as usize);
        let total: f64 = instances.iter().map(|i| i.actual_rate).sum();
        prop_assert!(close(total, count * full_rate));
        for instance in instances.iter().rev().skip(1) {
            prop_assert_eq!(instance.actual_rate, full_rate);
        }
    }
}
