//! Dependency graph for insert ordering
//!
//! Builds a directed graph of must-precede edges among the pending
//! operations of one flush. An edge `Y -> X` means Y must be inserted
//! before X because X holds an in-batch foreign-key reference to Y.
//! Externally satisfied references contribute no edges. Cycles are
//! expected at this stage (mutually-referencing rows) and are resolved
//! separately.

use crate::error::{ScheduleError, ScheduleResult};
use crate::op::{OpId, OperationDescriptor, RefTarget};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One foreign-key column backing a dependency edge
#[derive(Clone, Debug)]
pub struct EdgeColumn {
    /// Column on the referencing (later) operation
    pub column: String,
    /// Whether the column may be inserted as NULL and fixed up later
    pub nullable: bool,
}

/// Edge in the dependency graph
///
/// Parallel references between the same pair of operations collapse into
/// one edge carrying all of their columns.
#[derive(Clone, Debug, Default)]
pub struct DependencyEdge {
    /// Foreign-key columns backing this edge
    pub columns: Vec<EdgeColumn>,
}

impl DependencyEdge {
    /// An edge can be removed to break a cycle only if every column on it
    /// is nullable: inserting the referencing row first requires all of
    /// its columns pointing at the target to be left NULL.
    pub fn deferrable(&self) -> bool {
        !self.columns.is_empty() && self.columns.iter().all(|c| c.nullable)
    }
}

/// Dependency graph over one flush's pending operations
///
/// Nodes are exactly the input operations (isolated nodes allowed); edges
/// are a strict partial order request. Deterministic containers are used
/// wherever iteration order can reach the output order.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<OpId>,
    forward: HashMap<OpId, BTreeSet<OpId>>,
    backward: HashMap<OpId, BTreeSet<OpId>>,
    edges: BTreeMap<(OpId, OpId), DependencyEdge>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from one flush's pending operations
    ///
    /// Rejects malformed input immediately: duplicate ids, self-references
    /// and in-batch references to ids not present in the flush.
    pub fn build(ops: &[OperationDescriptor]) -> ScheduleResult<Self> {
        let mut graph = Self::new();

        for op in ops {
            if !graph.nodes.insert(op.id) {
                return Err(ScheduleError::DuplicateOperationId(op.id));
            }
        }

        for op in ops {
            for reference in &op.references {
                match &reference.target {
                    RefTarget::Pending(target) => {
                        if *target == op.id {
                            return Err(ScheduleError::SelfReference(op.id));
                        }
                        if !graph.nodes.contains(target) {
                            return Err(ScheduleError::DanglingReference {
                                op: op.id,
                                target: *target,
                            });
                        }
                        graph.add_edge(*target, op.id, &reference.column, reference.nullable);
                    }
                    // Already durable in a prior flush, no constraint.
                    RefTarget::Satisfied(_) => {}
                }
            }
        }

        Ok(graph)
    }

    /// Add an edge: `from` must be inserted before `to`
    pub fn add_edge(&mut self, from: OpId, to: OpId, column: &str, nullable: bool) {
        self.nodes.insert(from);
        self.nodes.insert(to);
        self.edges
            .entry((from, to))
            .or_default()
            .columns
            .push(EdgeColumn {
                column: column.to_owned(),
                nullable,
            });
        self.forward.entry(from).or_default().insert(to);
        self.backward.entry(to).or_default().insert(from);
    }

    /// Remove an edge, returning its column data if it existed
    pub fn remove_edge(&mut self, from: OpId, to: OpId) -> Option<DependencyEdge> {
        let edge = self.edges.remove(&(from, to))?;
        if let Some(succ) = self.forward.get_mut(&from) {
            succ.remove(&to);
        }
        if let Some(pred) = self.backward.get_mut(&to) {
            pred.remove(&from);
        }
        Some(edge)
    }

    /// Edge data between two operations, if any
    pub fn edge(&self, from: OpId, to: OpId) -> Option<&DependencyEdge> {
        self.edges.get(&(from, to))
    }

    /// All edges, in ascending (from, to) order
    pub fn edges(&self) -> impl Iterator<Item = (OpId, OpId, &DependencyEdge)> {
        self.edges.iter().map(|(&(from, to), edge)| (from, to, edge))
    }

    /// Operations that must wait for the given operation, ascending
    pub fn dependents(&self, id: OpId) -> Vec<OpId> {
        self.forward
            .get(&id)
            .map(|succ| succ.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Operations the given operation must wait for, ascending
    pub fn dependencies(&self, id: OpId) -> Vec<OpId> {
        self.backward
            .get(&id)
            .map(|pred| pred.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of unresolved incoming edges
    pub fn in_degree(&self, id: OpId) -> usize {
        self.backward.get(&id).map(BTreeSet::len).unwrap_or(0)
    }

    /// All nodes, ascending
    pub fn nodes(&self) -> impl Iterator<Item = OpId> + '_ {
        self.nodes.iter().copied()
    }

    /// Check if an operation is registered
    pub fn contains(&self, id: OpId) -> bool {
        self.nodes.contains(&id)
    }

    /// Total number of operations
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if the graph has no operations
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
