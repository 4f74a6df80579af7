//! label_graph
//!
//! Tier-tagged adjacency graph over segmentation labels, partition discovery
//! and per-partition Hopcroft-Karp matching.
//!
#![deny(missing_docs)]

mod error;
/// Partition graph and its traversals.
pub mod graph;
/// Maximum cardinality matching of owned objects to their owners.
pub mod matching;
mod tier;

pub use error::GraphError;
pub use graph::{Edge, Overlap, Partition, PartitionGraph, Traversal};
pub use matching::{hopcroft_karp, match_partitions, Matching, MatchingRules, TieBreak};
pub use tier::{Label, Tier, TierPair, Vertex};
