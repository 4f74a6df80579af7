use crate::tier::Vertex;

/// Failures raised while building or checking a partition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Both ends of a proposed edge belong to the same tier.
    #[error("cannot link {a} and {b}: edges must join two different tiers")]
    InvalidEdgeKind {
        /// first end
        a: Vertex,
        /// second end
        b: Vertex,
    },
    /// An arc was recorded without its reverse.
    #[error("graph is not undirected: {from} -> {to} is recorded but {to} -> {from} is not")]
    StructuralIntegrity {
        /// source of the lone arc
        from: Vertex,
        /// target of the lone arc
        to: Vertex,
    },
}
