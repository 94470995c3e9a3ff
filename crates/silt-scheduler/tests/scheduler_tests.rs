//! End-to-end tests for silt-scheduler
//!
//! Covers the externally observable contract of `schedule()`:
//! - dependency soundness over batching, for every input
//! - cycle breaking via nullable-column deferral
//! - pass-through mode
//! - batch-run segmentation and capping
//! - determinism, including property-based checks over random DAGs

use proptest::prelude::*;
use silt_scheduler::{
    schedule, BatchSignature, OpId, OperationDescriptor, Reference, ScheduleError,
    ScheduleOptions, SchedulePlan,
};
use std::collections::BTreeSet;

fn id(n: u32) -> OpId {
    OpId::new(n)
}

fn op(n: u32, table: &str, columns: &[&str]) -> OperationDescriptor {
    let mut op = OperationDescriptor::new(id(n), table);
    for c in columns {
        op = op.with_column(*c);
    }
    op
}

fn order_of(plan: &SchedulePlan) -> Vec<u32> {
    plan.ids().iter().map(|i| i.as_u32()).collect()
}

fn position(plan: &SchedulePlan, n: u32) -> usize {
    plan.ops
        .iter()
        .position(|o| o.id == id(n))
        .unwrap_or_else(|| panic!("op {n} missing from plan"))
}

// ============================================================================
// Ordering scenarios
// ============================================================================

#[test]
fn scenario_a_self_referencing_chain_stays_serialized() {
    // Same table, chain 1 <- 2 <- 3 <- 4, signatures alternating S1,S2,S1,S2.
    // The dependency chain forces full serialization; no reordering to
    // cluster same-signature rows is permitted.
    let ops = vec![
        op(1, "nodes", &["a"]),
        op(2, "nodes", &["b"]).with_reference(Reference::pending("parent_id", id(1), false)),
        op(3, "nodes", &["a"]).with_reference(Reference::pending("parent_id", id(2), false)),
        op(4, "nodes", &["b"]).with_reference(Reference::pending("parent_id", id(3), false)),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    assert_eq!(order_of(&plan), vec![1, 2, 3, 4]);
    // Maximal fragmentation: four runs of one
    assert_eq!(plan.run_count(), 4);
    assert_eq!(plan.longest_run(), 1);
}

#[test]
fn scenario_b_independent_chains_emit_contiguously() {
    // Two independent 3-op chains, uniform signature within each chain.
    let ops = vec![
        op(1, "a", &["x"]),
        op(2, "a", &["x"]).with_reference(Reference::pending("prev", id(1), false)),
        op(3, "a", &["x"]).with_reference(Reference::pending("prev", id(2), false)),
        op(4, "b", &["y"]),
        op(5, "b", &["y"]).with_reference(Reference::pending("prev", id(4), false)),
        op(6, "b", &["y"]).with_reference(Reference::pending("prev", id(5), false)),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    // Internal chain order preserved
    assert!(position(&plan, 1) < position(&plan, 2));
    assert!(position(&plan, 2) < position(&plan, 3));
    assert!(position(&plan, 4) < position(&plan, 5));
    assert!(position(&plan, 5) < position(&plan, 6));
    // Each chain is one contiguous run
    assert_eq!(order_of(&plan), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(plan.run_count(), 2);
    assert_eq!(plan.longest_run(), 3);
}

#[test]
fn scenario_c_external_reference_contributes_no_edge() {
    // P (id 2) holds one already-flushed reference and one in-batch
    // reference to Q (id 1).
    let ops = vec![
        op(1, "accounts", &["name"]),
        op(2, "orders", &["account_id", "warehouse_id"])
            .with_reference(Reference::satisfied("warehouse_id", "warehouse-3"))
            .with_reference(Reference::pending("account_id", id(1), false)),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    assert!(position(&plan, 1) < position(&plan, 2));
    // Only the in-batch reference became an edge
    assert_eq!(plan.dependency_count, 1);
}

// ============================================================================
// Cycle breaking
// ============================================================================

#[test]
fn two_node_cycle_defers_the_nullable_side() {
    let ops = vec![
        op(1, "employees", &["desk_id"])
            .with_reference(Reference::pending("desk_id", id(2), true)),
        op(2, "desks", &["employee_id"])
            .with_reference(Reference::pending("employee_id", id(1), false)),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    // The non-null side pins op1 first; op1's nullable column is deferred
    assert_eq!(order_of(&plan), vec![1, 2]);
    assert_eq!(plan.fixups.len(), 1);
    let fixup = &plan.fixups[0];
    assert_eq!(fixup.op, id(1));
    assert_eq!(fixup.column, "desk_id");
    // The fixup targets the later-inserted node
    assert_eq!(fixup.target, id(2));
    assert!(position(&plan, fixup.target.as_u32()) > position(&plan, fixup.op.as_u32()));
}

#[test]
fn two_node_cycle_with_no_nullable_edge_fails() {
    let ops = vec![
        op(1, "a", &["b_id"]).with_reference(Reference::pending("b_id", id(2), false)),
        op(2, "b", &["a_id"]).with_reference(Reference::pending("a_id", id(1), false)),
    ];
    let err = schedule(ops, &ScheduleOptions::default()).unwrap_err();

    match err {
        ScheduleError::CyclicNonNullDependency { participants } => {
            assert_eq!(participants, vec![id(1), id(2)]);
        }
        other => panic!("expected CyclicNonNullDependency, got {other:?}"),
    }
}

#[test]
fn cycle_member_still_ordered_after_other_dependencies() {
    // op3 -> cycle(op1, op2): breaking the cycle must not loosen op3's
    // constraint on both members.
    let ops = vec![
        op(1, "a", &["b_id", "root_id"])
            .with_reference(Reference::pending("b_id", id(2), true))
            .with_reference(Reference::pending("root_id", id(3), false)),
        op(2, "b", &["a_id"]).with_reference(Reference::pending("a_id", id(1), false)),
        op(3, "roots", &["name"]),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    assert!(position(&plan, 3) < position(&plan, 1));
    assert!(position(&plan, 1) < position(&plan, 2));
    assert_eq!(plan.fixups.len(), 1);
}

// ============================================================================
// Pass-through mode
// ============================================================================

#[test]
fn pass_through_equals_input_order_exactly() {
    let ops = vec![
        op(5, "a", &["x"]).with_reference(Reference::pending("fk", id(3), false)),
        op(3, "b", &["y"]),
        op(9, "a", &["x"]),
        op(1, "b", &["y"]).with_reference(Reference::pending("fk", id(9), true)),
    ];
    let plan = schedule(ops, &ScheduleOptions::unordered()).unwrap();

    assert_eq!(order_of(&plan), vec![5, 3, 9, 1]);
    assert!(plan.fixups.is_empty());
    assert_eq!(plan.dependency_count, 0);
}

#[test]
fn pass_through_still_segments_batch_runs() {
    let ops = vec![
        op(0, "a", &["x"]),
        op(1, "a", &["x"]),
        op(2, "b", &["y"]),
        op(3, "a", &["x"]),
    ];
    let mut options = ScheduleOptions::unordered();
    options.max_batch_size = 2;
    let plan = schedule(ops, &options).unwrap();

    assert_eq!(order_of(&plan), vec![0, 1, 2, 3]);
    let lens: Vec<usize> = plan.runs.iter().map(|r| r.len).collect();
    // [0,1] batch, [2], [3] — the trailing "a" is not adjacent to the
    // first run and starts its own
    assert_eq!(lens, vec![2, 1, 1]);
}

// ============================================================================
// Batch segmentation and capping
// ============================================================================

#[test]
fn capped_runs_cover_uniform_batch() {
    for (k, cap, expected) in [(10, 3, vec![3, 3, 3, 1]), (6, 2, vec![2, 2, 2]), (4, 32, vec![4])]
    {
        let ops: Vec<OperationDescriptor> = (0..k).map(|n| op(n, "a", &["x"])).collect();
        let plan = schedule(ops, &ScheduleOptions::new(cap)).unwrap();

        let lens: Vec<usize> = plan.runs.iter().map(|r| r.len).collect();
        assert_eq!(lens, expected, "k={k} cap={cap}");
    }
}

#[test]
fn runs_partition_the_plan() {
    let ops = vec![
        op(0, "a", &["x"]),
        op(1, "b", &["y"]),
        op(2, "a", &["x"]),
        op(3, "b", &["y"]),
        op(4, "b", &["y"]),
    ];
    let plan = schedule(ops, &ScheduleOptions::new(2)).unwrap();

    let mut next = 0;
    for run in &plan.runs {
        assert_eq!(run.start, next);
        assert!(run.len >= 1 && run.len <= 2);
        let sig = &run.signature;
        for pos in run.range() {
            assert_eq!(&BatchSignature::classify(&plan.ops[pos]), sig);
        }
        next = run.start + run.len;
    }
    assert_eq!(next, plan.len());
}

#[test]
fn dynamic_operations_never_share_a_run_unless_identical() {
    let ops = vec![
        op(0, "docs", &["a", "b"]).dynamic(),
        op(1, "docs", &["b", "a"]).dynamic(),
        op(2, "docs", &["a", "b"]).dynamic(),
    ];
    let plan = schedule(ops, &ScheduleOptions::default()).unwrap();

    // 0 and 2 share the exact populated-column list and batch together;
    // 1 differs in order and stays alone
    assert_eq!(order_of(&plan), vec![0, 2, 1]);
    assert_eq!(plan.run_count(), 2);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn repeated_invocations_are_byte_identical() {
    let build = || {
        vec![
            op(0, "a", &["x"]),
            op(1, "b", &["y"]).with_reference(Reference::pending("fk", id(0), false)),
            op(2, "a", &["x"]),
            op(3, "c", &["z"]).with_reference(Reference::pending("fk", id(2), true)),
            op(4, "b", &["y"]),
            op(5, "c", &["z"]),
        ]
    };
    let reference = schedule(build(), &ScheduleOptions::default()).unwrap();
    for _ in 0..5 {
        let plan = schedule(build(), &ScheduleOptions::default()).unwrap();
        assert_eq!(plan.ids(), reference.ids());
        assert_eq!(plan.fixups, reference.fixups);
    }
}

// ============================================================================
// Property-based checks
// ============================================================================

/// Random flush whose in-batch references always point at earlier ids, so
/// the dependency graph is acyclic by construction.
fn arb_acyclic_flush() -> impl Strategy<Value = Vec<OperationDescriptor>> {
    prop::collection::vec(
        (
            0u8..3,
            prop::collection::vec(0u8..4, 0..4),
            prop::collection::vec((any::<u32>(), any::<bool>()), 0..3),
            any::<bool>(),
        ),
        1..25,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (table, cols, refs, dynamic))| {
                let mut o = OperationDescriptor::new(OpId::new(i as u32), format!("t{table}"));
                let mut seen = BTreeSet::new();
                for c in cols {
                    if seen.insert(c) {
                        o = o.with_column(format!("c{c}"));
                    }
                }
                if dynamic {
                    o = o.dynamic();
                }
                if i > 0 {
                    let mut used = BTreeSet::new();
                    for (t, nullable) in refs {
                        let target = (t as usize) % i;
                        if used.insert(target) {
                            o = o.with_reference(Reference::pending(
                                format!("fk{target}"),
                                OpId::new(target as u32),
                                nullable,
                            ));
                        }
                    }
                }
                o
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_plan_is_a_sound_permutation(ops in arb_acyclic_flush()) {
        let input_ids: BTreeSet<OpId> = ops.iter().map(|o| o.id).collect();
        let plan = schedule(ops.clone(), &ScheduleOptions::default()).unwrap();

        // Permutation of the input
        let output_ids: BTreeSet<OpId> = plan.ids().into_iter().collect();
        prop_assert_eq!(&output_ids, &input_ids);
        prop_assert_eq!(plan.len(), ops.len());

        // Every referenced op strictly precedes the referencing op
        for o in &plan.ops {
            for r in &o.references {
                if let silt_scheduler::RefTarget::Pending(target) = r.target {
                    prop_assert!(
                        position(&plan, target.as_u32()) < position(&plan, o.id.as_u32()),
                        "op {:?} scheduled before its target {:?}",
                        o.id,
                        target
                    );
                }
            }
        }

        // Acyclic input never needs fixups
        prop_assert!(plan.fixups.is_empty());
    }

    #[test]
    fn prop_schedule_is_deterministic(ops in arb_acyclic_flush()) {
        let first = schedule(ops.clone(), &ScheduleOptions::default()).unwrap();
        let second = schedule(ops, &ScheduleOptions::default()).unwrap();
        prop_assert_eq!(first.ids(), second.ids());
    }

    #[test]
    fn prop_runs_are_uniform_and_capped(ops in arb_acyclic_flush(), cap in 1usize..6) {
        let plan = schedule(ops, &ScheduleOptions::new(cap)).unwrap();

        let mut next = 0;
        for run in &plan.runs {
            prop_assert_eq!(run.start, next);
            prop_assert!(run.len >= 1 && run.len <= cap);
            for pos in run.range() {
                prop_assert_eq!(&BatchSignature::classify(&plan.ops[pos]), &run.signature);
            }
            next = run.start + run.len;
        }
        prop_assert_eq!(next, plan.len());
    }

    #[test]
    fn prop_pass_through_preserves_input(ops in arb_acyclic_flush()) {
        let input_ids: Vec<OpId> = ops.iter().map(|o| o.id).collect();
        let plan = schedule(ops, &ScheduleOptions::unordered()).unwrap();
        prop_assert_eq!(plan.ids(), input_ids);
    }
}
