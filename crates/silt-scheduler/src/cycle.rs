//! Cycle detection and resolution
//!
//! Mutually-referencing rows (e.g. both sides of a one-to-one pointing at
//! each other) form cycles in the dependency graph. A cycle is breakable
//! when it contains an edge whose foreign-key columns are all nullable:
//! the referencing row is inserted with those columns NULL and a deferred
//! fixup writes the key back after both sides exist. A cycle with no such
//! edge is a modeling error.

use crate::dependency::DependencyGraph;
use crate::error::{ScheduleError, ScheduleResult};
use crate::op::OpId;
use std::collections::{HashMap, HashSet};

/// A post-insert update completing a foreign-key assignment deliberately
/// left NULL to break a cycle at insert time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredFixup {
    /// Operation whose row is inserted with the column NULL
    pub op: OpId,
    /// Column left NULL at insert time
    pub column: String,
    /// Operation whose key must be written back once both are inserted
    pub target: OpId,
}

/// Break every dependency cycle in the graph, or fail
///
/// For each strongly-connected component of size > 1, removes the
/// deterministically lowest deferrable edge (lowest owner id, ties by
/// lowest target id) and records one fixup per deferred column. Repeats
/// until no component of size > 1 remains; each removal strictly shrinks
/// at least one component, so the loop terminates. A component with no
/// deferrable edge raises `CyclicNonNullDependency`.
pub fn resolve_cycles(graph: &mut DependencyGraph) -> ScheduleResult<Vec<DeferredFixup>> {
    let mut fixups = Vec::new();

    loop {
        let cyclic: Vec<Vec<OpId>> = strongly_connected_components(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .collect();

        if cyclic.is_empty() {
            break;
        }

        for scc in cyclic {
            break_one_edge(graph, &scc, &mut fixups)?;
        }
    }

    Ok(fixups)
}

/// Remove the lowest deferrable edge inside one component
fn break_one_edge(
    graph: &mut DependencyGraph,
    scc: &[OpId],
    fixups: &mut Vec<DeferredFixup>,
) -> ScheduleResult<()> {
    let members: HashSet<OpId> = scc.iter().copied().collect();

    // The owner of an edge is its head: the operation holding the
    // foreign-key column.
    let chosen = graph
        .edges()
        .filter(|(from, to, edge)| {
            members.contains(from) && members.contains(to) && edge.deferrable()
        })
        .map(|(from, to, _)| (to, from))
        .min();

    let Some((owner, target)) = chosen else {
        return Err(ScheduleError::CyclicNonNullDependency {
            participants: scc.to_vec(),
        });
    };

    if let Some(edge) = graph.remove_edge(target, owner) {
        for col in edge.columns {
            tracing::debug!(
                "breaking insert cycle: deferring {} on op {} until op {} is inserted",
                col.column,
                owner.as_u32(),
                target.as_u32()
            );
            fixups.push(DeferredFixup {
                op: owner,
                column: col.column,
                target,
            });
        }
    }

    Ok(())
}

/// Tarjan's algorithm, iterative
///
/// Roots are visited in ascending id order and successors are yielded in
/// ascending id order, so component discovery is deterministic.
pub fn strongly_connected_components(graph: &DependencyGraph) -> Vec<Vec<OpId>> {
    let mut index: HashMap<OpId, usize> = HashMap::new();
    let mut lowlink: HashMap<OpId, usize> = HashMap::new();
    let mut on_stack: HashSet<OpId> = HashSet::new();
    let mut stack: Vec<OpId> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs = Vec::new();

    for root in graph.nodes() {
        if index.contains_key(&root) {
            continue;
        }

        index.insert(root, next_index);
        lowlink.insert(root, next_index);
        next_index += 1;
        stack.push(root);
        on_stack.insert(root);

        let mut frames: Vec<(OpId, std::vec::IntoIter<OpId>)> =
            vec![(root, graph.dependents(root).into_iter())];

        while let Some((node, successors)) = frames.last_mut() {
            let node = *node;
            if let Some(next) = successors.next() {
                if !index.contains_key(&next) {
                    index.insert(next, next_index);
                    lowlink.insert(next, next_index);
                    next_index += 1;
                    stack.push(next);
                    on_stack.insert(next);
                    frames.push((next, graph.dependents(next).into_iter()));
                } else if on_stack.contains(&next) {
                    let low = lowlink[&node].min(index[&next]);
                    lowlink.insert(node, low);
                }
            } else {
                frames.pop();
                if let Some((parent, _)) = frames.last() {
                    let low = lowlink[parent].min(lowlink[&node]);
                    lowlink.insert(*parent, low);
                }
                if lowlink[&node] == index[&node] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack.remove(&w);
                        component.push(w);
                        if w == node {
                            break;
                        }
                    }
                    component.sort_unstable();
                    sccs.push(component);
                }
            }
        }
    }

    sccs
}
