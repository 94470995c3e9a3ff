//! Batch signature classification
//!
//! A batch signature is an equality key: two operations may share one
//! batched statement iff their signatures compare equal. The classifier
//! performs no cross-operation comparison itself.

use crate::op::OperationDescriptor;
use std::collections::BTreeSet;
use std::fmt;

/// Statement shape component of a signature
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum StatementShape {
    /// Shape fixed per entity type: the sorted set of populated columns
    Fixed(BTreeSet<String>),
    /// Shape computed per instance: the full ordered column list, so two
    /// dynamic operations compare equal only if their populated columns
    /// match byte for byte
    PerInstance(Vec<String>),
}

/// Equality key determining which operations may share one batched
/// statement
///
/// Same table plus same statement shape. A dynamic operation's signature
/// never equals a fixed-shape signature for the same table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BatchSignature {
    table: String,
    shape: StatementShape,
}

impl BatchSignature {
    /// Compute the signature for one operation
    pub fn classify(op: &OperationDescriptor) -> Self {
        let shape = if op.dynamic {
            StatementShape::PerInstance(op.columns.clone())
        } else {
            StatementShape::Fixed(op.columns.iter().cloned().collect())
        };
        Self {
            table: op.table.clone(),
            shape,
        }
    }

    /// Target table of the batched statement
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether this signature came from a per-instance statement shape
    pub fn is_dynamic(&self) -> bool {
        matches!(self.shape, StatementShape::PerInstance(_))
    }
}

impl fmt::Display for BatchSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            StatementShape::Fixed(cols) => {
                let cols: Vec<&str> = cols.iter().map(String::as_str).collect();
                write!(f, "{}({})", self.table, cols.join(","))
            }
            StatementShape::PerInstance(cols) => {
                write!(f, "{}!({})", self.table, cols.join(","))
            }
        }
    }
}
