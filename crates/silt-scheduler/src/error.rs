//! Error types for the scheduler

use crate::op::OpId;
use thiserror::Error;

/// Scheduler errors
///
/// None of these are transient and none are retried internally; all
/// propagate to the caller, which decides whether to abort the
/// surrounding transaction.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A dependency cycle exists in which no foreign-key column is
    /// nullable; the entity graph cannot be persisted in any order
    #[error("dependency cycle with no nullable column among operations {participants:?}")]
    CyclicNonNullDependency {
        /// Operations in the cycle, in ascending id order
        participants: Vec<OpId>,
    },

    /// The ready set drained with operations left unscheduled after cycle
    /// resolution; internal invariant violation, always fatal
    #[error("ordering invariant violated: {remaining} operations unscheduled with empty ready set")]
    OrderingInvariantViolated {
        /// Operations that never became ready
        remaining: usize,
    },

    /// Two operations in one flush carry the same id
    #[error("duplicate operation id {0:?}")]
    DuplicateOperationId(OpId),

    /// An operation references itself
    #[error("operation {0:?} references itself")]
    SelfReference(OpId),

    /// An in-batch reference targets an id not present in the flush
    #[error("operation {op:?} references {target:?} which is not part of this flush")]
    DanglingReference {
        /// The referencing operation
        op: OpId,
        /// The missing target
        target: OpId,
    },

    /// The batching cap must be at least 1
    #[error("max batch size must be at least 1, got {0}")]
    InvalidMaxBatchSize(usize),
}

/// Result type for scheduler operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;
