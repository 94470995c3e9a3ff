//! # silt-scheduler
//!
//! Insert-batch scheduling for the Silt persistence engine.
//!
//! Given the row-insert operations one flush has queued, this crate
//! produces a total execution order that never inserts a row before a row
//! it references by foreign key, while grouping batch-compatible
//! operations into the longest possible contiguous runs so the store can
//! execute them as single batched statements.
//!
//! Pipeline:
//! - Dependency graph construction from in-batch foreign-key references
//! - Cycle resolution via nullable-column deferral (or a modeling error)
//! - Topological sort with signature-grouped ready sets
//! - Batch-run segmentation capped at the configured maximum batch size
//!
//! Correctness always wins over batching: grouping only arbitrates among
//! operations whose dependencies are already satisfied. The result is
//! deterministic for identical input.
//!
//! ## Usage
//!
//! ```ignore
//! use silt_scheduler::{schedule, OperationDescriptor, OpId, Reference, ScheduleOptions};
//!
//! let ops = vec![
//!     OperationDescriptor::new(OpId::new(0), "orders")
//!         .with_column("customer_id")
//!         .with_reference(Reference::pending("customer_id", OpId::new(1), false)),
//!     OperationDescriptor::new(OpId::new(1), "customers").with_column("name"),
//! ];
//! let plan = schedule(ops, &ScheduleOptions::default())?;
//! for run in &plan.runs {
//!     // execute plan.ops[run.range()] as one batched statement
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cycle;
mod dependency;
mod error;
mod op;
mod scheduler;
mod signature;

pub use cycle::{resolve_cycles, strongly_connected_components, DeferredFixup};
pub use dependency::{DependencyEdge, DependencyGraph, EdgeColumn};
pub use error::{ScheduleError, ScheduleResult};
pub use op::{OpId, OperationDescriptor, PendingKey, RefTarget, Reference};
pub use scheduler::{
    schedule, BatchRun, ScheduleOptions, SchedulePlan, DEFAULT_MAX_BATCH_SIZE,
};
pub use signature::BatchSignature;
