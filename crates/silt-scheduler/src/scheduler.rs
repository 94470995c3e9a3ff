//! Insert-batch scheduling
//!
//! Produces a linear extension of the dependency partial order in which
//! runs of consecutive operations sharing a batch signature are as long
//! as possible. Dependency satisfaction is checked before batch grouping
//! is ever consulted: grouping only arbitrates among operations that are
//! already legal to emit, so batching can never reorder a row ahead of a
//! row it references.

use crate::cycle::{resolve_cycles, DeferredFixup};
use crate::dependency::DependencyGraph;
use crate::error::{ScheduleError, ScheduleResult};
use crate::op::{OpId, OperationDescriptor};
use crate::signature::BatchSignature;
use std::collections::{BTreeSet, HashMap};

/// Default batching cap when the engine does not configure one
pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;

/// Engine-wide toggles honored by the scheduler
///
/// Passed explicitly per invocation; the scheduler holds no ambient
/// configuration state.
#[derive(Clone, Debug)]
pub struct ScheduleOptions {
    /// When false the sorter is bypassed entirely and the plan preserves
    /// creation order, regardless of dependencies or signatures
    pub order_inserts: bool,
    /// Maximum contiguous run length per batched statement, >= 1
    pub max_batch_size: usize,
}

impl ScheduleOptions {
    /// Options with ordering enabled and the given batching cap
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            order_inserts: true,
            max_batch_size,
        }
    }

    /// Pass-through options: creation order, default batching cap
    pub fn unordered() -> Self {
        Self {
            order_inserts: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}

/// A contiguous same-signature segment of the plan
///
/// Batch boundary markers for the executor: each run may execute as one
/// batched statement. Runs are capped at the configured maximum batch
/// size even when more same-signature operations follow contiguously.
#[derive(Clone, Debug)]
pub struct BatchRun {
    /// Signature shared by every operation in the run
    pub signature: BatchSignature,
    /// Position of the first operation in the plan order
    pub start: usize,
    /// Number of operations in the run
    pub len: usize,
}

impl BatchRun {
    /// Index range of this run within the plan order
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Output of one scheduling invocation
#[derive(Clone, Debug)]
pub struct SchedulePlan {
    /// Operations in execution order
    pub ops: Vec<OperationDescriptor>,
    /// Batch runs covering the order, in order
    pub runs: Vec<BatchRun>,
    /// Post-insert updates for cycle-broken foreign keys, to execute once
    /// both endpoints are inserted
    pub fixups: Vec<DeferredFixup>,
    /// Number of must-precede edges the order satisfied
    pub dependency_count: usize,
}

impl SchedulePlan {
    /// Number of scheduled operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the plan is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operation ids in execution order
    pub fn ids(&self) -> Vec<OpId> {
        self.ops.iter().map(|op| op.id).collect()
    }

    /// Number of batch runs
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Length of the longest batch run
    pub fn longest_run(&self) -> usize {
        self.runs.iter().map(|run| run.len).max().unwrap_or(0)
    }
}

/// Schedule one flush's pending inserts
///
/// The single entry point: builds the dependency graph, resolves cycles,
/// produces the batched linear order and segments it into capped runs.
/// With `order_inserts` disabled the plan preserves input order exactly
/// and emits no fixups; runs are still segmented because batching is
/// governed independently by `max_batch_size`.
pub fn schedule(
    ops: Vec<OperationDescriptor>,
    options: &ScheduleOptions,
) -> ScheduleResult<SchedulePlan> {
    if options.max_batch_size == 0 {
        return Err(ScheduleError::InvalidMaxBatchSize(0));
    }

    if !options.order_inserts {
        let signatures: Vec<BatchSignature> = ops.iter().map(BatchSignature::classify).collect();
        let runs = segment_runs(&signatures, options.max_batch_size);
        tracing::debug!(
            "insert ordering disabled: passing through {} operations in {} runs",
            ops.len(),
            runs.len()
        );
        return Ok(SchedulePlan {
            ops,
            runs,
            fixups: Vec::new(),
            dependency_count: 0,
        });
    }

    let mut graph = DependencyGraph::build(&ops)?;
    let dependency_count = graph.edge_count();
    let fixups = resolve_cycles(&mut graph)?;

    let signatures: HashMap<OpId, BatchSignature> = ops
        .iter()
        .map(|op| (op.id, BatchSignature::classify(op)))
        .collect();

    let order = topo_batch_order(graph, &signatures)?;

    let mut by_id: HashMap<OpId, OperationDescriptor> =
        ops.into_iter().map(|op| (op.id, op)).collect();
    let mut ordered = Vec::with_capacity(order.len());
    for id in &order {
        if let Some(op) = by_id.remove(id) {
            ordered.push(op);
        }
    }
    if !by_id.is_empty() {
        return Err(ScheduleError::OrderingInvariantViolated {
            remaining: by_id.len(),
        });
    }

    let ordered_signatures: Vec<BatchSignature> =
        ordered.iter().map(BatchSignature::classify).collect();
    let runs = segment_runs(&ordered_signatures, options.max_batch_size);

    tracing::debug!(
        "scheduled flush: {} operations, {} dependencies, {} runs, {} deferred fixups",
        ordered.len(),
        dependency_count,
        runs.len(),
        fixups.len()
    );

    Ok(SchedulePlan {
        ops: ordered,
        runs,
        fixups,
        dependency_count,
    })
}

/// Kahn-style linear extension with signature-grouped ready sets
///
/// Each step prefers the previously emitted signature while it still has
/// ready members, otherwise the largest ready group (ties to the group
/// with the lowest minimum id). Within a group the lowest id is emitted.
/// The graph must be acyclic; an empty ready set with operations left is
/// an internal invariant violation, never an infinite loop.
fn topo_batch_order(
    mut graph: DependencyGraph,
    signatures: &HashMap<OpId, BatchSignature>,
) -> ScheduleResult<Vec<OpId>> {
    let total = graph.node_count();
    let mut ready: HashMap<BatchSignature, BTreeSet<OpId>> = HashMap::new();

    let nodes: Vec<OpId> = graph.nodes().collect();
    for id in nodes {
        if graph.in_degree(id) == 0 {
            if let Some(sig) = signatures.get(&id) {
                ready.entry(sig.clone()).or_default().insert(id);
            }
        }
    }

    let mut order = Vec::with_capacity(total);
    let mut last_signature: Option<BatchSignature> = None;

    while order.len() < total {
        let signature = match last_signature
            .take()
            .filter(|sig| ready.get(sig).is_some_and(|group| !group.is_empty()))
        {
            // Stay with the current batch while possible
            Some(sig) => sig,
            None => {
                let best = ready
                    .iter()
                    .filter(|(_, group)| !group.is_empty())
                    .max_by(|(_, a), (_, b)| {
                        a.len()
                            .cmp(&b.len())
                            .then_with(|| b.first().cmp(&a.first()))
                    })
                    .map(|(sig, _)| (*sig).clone());
                match best {
                    Some(sig) => sig,
                    None => {
                        return Err(ScheduleError::OrderingInvariantViolated {
                            remaining: total - order.len(),
                        })
                    }
                }
            }
        };

        let id = match ready.get_mut(&signature).and_then(BTreeSet::pop_first) {
            Some(id) => id,
            None => {
                return Err(ScheduleError::OrderingInvariantViolated {
                    remaining: total - order.len(),
                })
            }
        };

        tracing::trace!("emit op {} ({})", id.as_u32(), signature);
        order.push(id);

        for succ in graph.dependents(id) {
            graph.remove_edge(id, succ);
            if graph.in_degree(succ) == 0 {
                if let Some(sig) = signatures.get(&succ) {
                    ready.entry(sig.clone()).or_default().insert(succ);
                }
            }
        }

        last_signature = Some(signature);
    }

    Ok(order)
}

/// Segment an ordered signature sequence into capped same-signature runs
fn segment_runs(signatures: &[BatchSignature], max_batch_size: usize) -> Vec<BatchRun> {
    let mut runs: Vec<BatchRun> = Vec::new();
    for (pos, sig) in signatures.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.signature == *sig && run.len < max_batch_size => run.len += 1,
            _ => runs.push(BatchRun {
                signature: sig.clone(),
                start: pos,
                len: 1,
            }),
        }
    }
    runs
}
