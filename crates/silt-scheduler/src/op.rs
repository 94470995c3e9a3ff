//! Operation descriptors for pending row inserts

/// Operation identifier
///
/// Engine-assigned insertion sequence number. Used only for tie-breaking,
/// never for correctness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl OpId {
    /// Create a new operation ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for OpId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for OpId {
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

/// Primary-key state of a pending insert
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingKey {
    /// Key value already assigned (natural or application-assigned key)
    Assigned(String),
    /// The store will generate the key on insert
    Unassigned,
}

impl PendingKey {
    /// Check whether the key is already assigned
    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned(_))
    }
}

/// Target of a foreign-key reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTarget {
    /// Another operation pending in the same flush
    Pending(OpId),
    /// A key already durably inserted by a prior flush of the same unit
    /// of work; imposes no ordering constraint
    Satisfied(String),
}

/// A foreign-key reference held by an operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// Column holding the foreign key
    pub column: String,
    /// What the column points at
    pub target: RefTarget,
    /// Whether the column may legally be inserted as NULL and fixed up
    /// by a later statement
    pub nullable: bool,
}

impl Reference {
    /// Reference to another operation pending in the same flush
    pub fn pending(column: impl Into<String>, target: OpId, nullable: bool) -> Self {
        Self {
            column: column.into(),
            target: RefTarget::Pending(target),
            nullable,
        }
    }

    /// Reference to a key already satisfied by a prior flush
    pub fn satisfied(column: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            target: RefTarget::Satisfied(key.into()),
            nullable: false,
        }
    }
}

/// One pending row insert
///
/// Constructed fresh for each flush from the caller's cascade-expanded
/// pending list, consumed once by the scheduler, never mutated by it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Engine-assigned insertion sequence number
    pub id: OpId,
    /// Target table
    pub table: String,
    /// Primary-key state
    pub pending_key: PendingKey,
    /// Foreign-key references, in declaration order
    pub references: Vec<Reference>,
    /// Columns populated with a non-null, non-default value, in
    /// statement order
    pub columns: Vec<String>,
    /// Statement shape is computed per instance rather than fixed per
    /// entity type
    pub dynamic: bool,
}

impl OperationDescriptor {
    /// Create a descriptor with no references and no populated columns
    pub fn new(id: OpId, table: impl Into<String>) -> Self {
        Self {
            id,
            table: table.into(),
            pending_key: PendingKey::Unassigned,
            references: Vec::new(),
            columns: Vec::new(),
            dynamic: false,
        }
    }

    /// Set an already-assigned primary key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.pending_key = PendingKey::Assigned(key.into());
        self
    }

    /// Add a foreign-key reference
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Add a populated column
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Mark the statement shape as computed per instance
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }
}
