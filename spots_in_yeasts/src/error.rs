use label_graph::{GraphError, Tier};

/// Reasons a field of view cannot be assigned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignError {
    /// Same-tier edge or asymmetric adjacency. Both point at a bug upstream
    /// of the matching, so the field of view is abandoned.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A tier holds nothing but background.
    #[error("no {tier} labels in the field of view")]
    EmptyInput {
        /// tier without foreground
        tier: Tier,
    },
    /// Label arrays of one field of view disagree in shape.
    #[error("{tier} labels have shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        /// tier whose array is off
        tier: Tier,
        /// reference shape (the cell labels)
        expected: (usize, usize),
        /// offending shape
        found: (usize, usize),
    },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
