use crate::error::GraphError;
use crate::tier::Vertex;
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Number of pixels two adjacent objects share (or touch across).
pub type Overlap = u64;

/// Undirected edge with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    /// smaller end
    pub a: Vertex,
    /// larger end
    pub b: Vertex,
    /// overlap recorded when the edge was added
    pub overlap: Overlap,
}

impl Edge {
    fn between(x: Vertex, y: Vertex, overlap: Overlap) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Edge { a, b, overlap }
    }

    /// The end that is not `v`, if `v` is an end of this edge.
    pub fn other(&self, v: Vertex) -> Option<Vertex> {
        if self.a == v {
            Some(self.b)
        } else if self.b == v {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Maximal connected component of a [`PartitionGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// sorted vertices
    pub vertices: Vec<Vertex>,
    /// sorted incident edges
    pub edges: Vec<Edge>,
}

impl Partition {
    /// A single vertex without any adjacency.
    pub fn is_singleton(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether `v` belongs to this partition.
    pub fn contains(&self, v: Vertex) -> bool {
        self.vertices.binary_search(&v).is_ok()
    }
}

/// Adjacency between tier-tagged labels.
///
/// Vertices live in an index arena; every undirected edge is stored as two
/// arcs so that symmetry can be verified with [`PartitionGraph::is_undirected`].
#[derive(Debug, Clone, Default)]
pub struct PartitionGraph {
    graph: DiGraph<Vertex, Overlap>,
    nodes: BTreeMap<Vertex, NodeIndex>,
}

impl PartitionGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `v` without linking it. Adding a known vertex is a no-op.
    pub fn add_vertex(&mut self, v: Vertex) {
        self.node(v);
    }

    fn node(&mut self, v: Vertex) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&v) {
            return idx;
        }
        let idx = self.graph.add_node(v);
        self.nodes.insert(v, idx);
        idx
    }

    fn upsert_arc(&mut self, from: NodeIndex, to: NodeIndex, overlap: Overlap) {
        match self.graph.find_edge(from, to) {
            Some(e) => self.graph[e] = overlap,
            None => {
                self.graph.add_edge(from, to, overlap);
            }
        }
    }

    /// Link `a` and `b` in both directions. Re-adding an edge replaces its overlap.
    pub fn add_edge(&mut self, a: Vertex, b: Vertex, overlap: Overlap) -> Result<(), GraphError> {
        if a.tier == b.tier {
            return Err(GraphError::InvalidEdgeKind { a, b });
        }
        let (ia, ib) = (self.node(a), self.node(b));
        self.upsert_arc(ia, ib, overlap);
        self.upsert_arc(ib, ia, overlap);
        Ok(())
    }

    /// Record a single arc. Only used to corrupt graphs in tests.
    #[cfg(test)]
    pub(crate) fn insert_arc(&mut self, from: Vertex, to: Vertex, overlap: Overlap) {
        let (ifrom, ito) = (self.node(from), self.node(to));
        self.upsert_arc(ifrom, ito, overlap);
    }

    /// Whether `v` is a vertex of this graph.
    pub fn contains(&self, v: Vertex) -> bool {
        self.nodes.contains_key(&v)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    /// Vertices in ascending order.
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.nodes.keys().copied()
    }

    /// All edges, sorted, each reported once whatever the direction it was recorded in.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .map(|e| Edge::between(self.graph[e.source()], self.graph[e.target()], *e.weight()))
            .sorted()
            .dedup_by(|x, y| (x.a, x.b) == (y.a, y.b))
            .collect()
    }

    fn sorted_neighbors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .sorted_by_key(|&n| self.graph[n])
            .dedup()
            .collect()
    }

    /// Vertices adjacent to `v` in ascending order. Empty for unknown vertices.
    pub fn neighbors(&self, v: Vertex) -> Vec<Vertex> {
        self.nodes
            .get(&v)
            .map(|&idx| {
                self.sorted_neighbors(idx)
                    .into_iter()
                    .map(|n| self.graph[n])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lazy breadth-first walk from `start`. Neighbors are expanded in ascending order.
    pub fn bfs(&self, start: Vertex) -> Traversal<'_> {
        Traversal::new(self, start, Order::BreadthFirst)
    }

    /// Lazy depth-first (pre-order) walk from `start`, driven by an explicit stack.
    pub fn dfs(&self, start: Vertex) -> Traversal<'_> {
        Traversal::new(self, start, Order::DepthFirst)
    }

    /// Maximal connected components ordered by their smallest vertex.
    ///
    /// Every vertex lands in exactly one partition; isolated vertices form
    /// singleton partitions.
    pub fn find_partitions(&self) -> Vec<Partition> {
        let mut assigned = vec![false; self.graph.node_count()];
        let mut partitions = Vec::new();
        for (&start, &idx) in &self.nodes {
            if assigned[idx.index()] {
                continue;
            }
            let vertices: Vec<Vertex> = self.bfs(start).sorted().collect();
            let mut edges = BTreeMap::new();
            for v in &vertices {
                let v_idx = self.nodes[v];
                assigned[v_idx.index()] = true;
                for e in self.graph.edges_directed(v_idx, Direction::Outgoing) {
                    let edge = Edge::between(*v, self.graph[e.target()], *e.weight());
                    edges.entry((edge.a, edge.b)).or_insert(edge);
                }
            }
            partitions.push(Partition {
                vertices,
                edges: edges.into_values().collect(),
            });
        }
        partitions
    }

    /// True iff every recorded arc has its reverse.
    pub fn is_undirected(&self) -> bool {
        self.check_undirected().is_ok()
    }

    /// Report the first arc lacking its reverse. The graph is never repaired.
    pub fn check_undirected(&self) -> Result<(), GraphError> {
        match self
            .graph
            .edge_references()
            .find(|e| self.graph.find_edge(e.target(), e.source()).is_none())
        {
            Some(e) => Err(GraphError::StructuralIntegrity {
                from: self.graph[e.source()],
                to: self.graph[e.target()],
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    BreadthFirst,
    DepthFirst,
}

/// Lazy walk over the vertices reachable from a start vertex.
pub struct Traversal<'a> {
    graph: &'a PartitionGraph,
    order: Order,
    frontier: VecDeque<NodeIndex>,
    seen: Vec<bool>,
}

impl<'a> Traversal<'a> {
    fn new(graph: &'a PartitionGraph, start: Vertex, order: Order) -> Self {
        let mut seen = vec![false; graph.graph.node_count()];
        let mut frontier = VecDeque::new();
        if let Some(&idx) = graph.nodes.get(&start) {
            if order == Order::BreadthFirst {
                seen[idx.index()] = true;
            }
            frontier.push_back(idx);
        }
        Traversal {
            graph,
            order,
            frontier,
            seen,
        }
    }
}

impl Iterator for Traversal<'_> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Vertex> {
        loop {
            let idx = match self.order {
                Order::BreadthFirst => self.frontier.pop_front()?,
                Order::DepthFirst => self.frontier.pop_back()?,
            };
            if self.order == Order::DepthFirst {
                // a vertex may sit on the stack several times
                if self.seen[idx.index()] {
                    continue;
                }
                self.seen[idx.index()] = true;
            }
            let neighbors = self.graph.sorted_neighbors(idx);
            match self.order {
                Order::BreadthFirst => {
                    for n in neighbors {
                        if !self.seen[n.index()] {
                            self.seen[n.index()] = true;
                            self.frontier.push_back(n);
                        }
                    }
                }
                Order::DepthFirst => {
                    // pushed in reverse so that the smallest neighbor is popped first
                    for n in neighbors.into_iter().rev() {
                        if !self.seen[n.index()] {
                            self.frontier.push_back(n);
                        }
                    }
                }
            }
            return Some(self.graph.graph[idx]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn n(label: u32) -> Vertex {
        Vertex::nucleus(label)
    }
    fn c(label: u32) -> Vertex {
        Vertex::cell(label)
    }

    /// n1-c10, n1-c20, n3-c10, n2-c20 plus an isolated spot
    fn small_graph() -> PartitionGraph {
        let mut graph = PartitionGraph::new();
        graph.add_edge(n(1), c(10), 5).unwrap();
        graph.add_edge(n(1), c(20), 3).unwrap();
        graph.add_edge(c(10), n(3), 7).unwrap();
        graph.add_edge(n(2), c(20), 1).unwrap();
        graph.add_vertex(Vertex::spot(4));
        graph
    }

    #[test]
    fn test_add_edge_is_symmetric() {
        let graph = small_graph();
        assert!(graph.is_undirected());
        assert_eq!(graph.vertex_count(), 6);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.neighbors(c(10)), vec![n(1), n(3)]);
        assert_eq!(graph.neighbors(n(1)), vec![c(10), c(20)]);
        assert!(graph.neighbors(Vertex::spot(4)).is_empty());
        assert!(graph.neighbors(Vertex::spot(99)).is_empty());
    }

    #[test]
    fn test_same_tier_edge_rejected() {
        let mut graph = PartitionGraph::new();
        assert_eq!(
            graph.add_edge(c(1), c(2), 10),
            Err(GraphError::InvalidEdgeKind { a: c(1), b: c(2) })
        );
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_lone_arc_breaks_undirectedness() {
        let mut graph = small_graph();
        graph.insert_arc(n(2), c(10), 4);
        assert!(!graph.is_undirected());
        assert_eq!(
            graph.check_undirected(),
            Err(GraphError::StructuralIntegrity {
                from: n(2),
                to: c(10)
            })
        );
    }

    #[test]
    fn test_re_adding_edge_replaces_overlap() {
        let mut graph = PartitionGraph::new();
        graph.add_edge(n(1), c(1), 5).unwrap();
        graph.add_edge(c(1), n(1), 8).unwrap();
        assert_eq!(graph.edges(), vec![Edge::between(n(1), c(1), 8)]);
        assert!(graph.is_undirected());
    }

    #[test]
    fn test_traversal_orders() {
        let graph = small_graph();
        assert_eq!(
            graph.bfs(n(1)).collect::<Vec<_>>(),
            vec![n(1), c(10), c(20), n(3), n(2)]
        );
        assert_eq!(
            graph.dfs(n(1)).collect::<Vec<_>>(),
            vec![n(1), c(10), n(3), c(20), n(2)]
        );
        // restartable
        assert_eq!(graph.bfs(n(1)).count(), 5);
        assert_eq!(graph.dfs(n(1)).count(), 5);
        assert_eq!(
            graph.bfs(Vertex::spot(4)).collect::<Vec<_>>(),
            vec![Vertex::spot(4)]
        );
        assert_eq!(graph.dfs(c(77)).count(), 0);
    }

    #[test]
    fn test_find_partitions() {
        let mut graph = small_graph();
        graph.add_edge(n(8), c(80), 2).unwrap();
        let partitions = graph.find_partitions();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].vertices, vec![Vertex::spot(4)]);
        assert!(partitions[0].is_singleton());
        assert_eq!(
            partitions[1].vertices,
            vec![n(1), n(2), n(3), c(10), c(20)]
        );
        assert_eq!(partitions[1].edges.len(), 4);
        assert_eq!(partitions[2].vertices, vec![n(8), c(80)]);
        assert_eq!(partitions[2].edges, vec![Edge::between(c(80), n(8), 2)]);
        assert!(partitions[1].contains(c(20)));
        assert!(!partitions[1].contains(c(80)));
    }

    #[test]
    fn test_edge_other() {
        let edge = Edge::between(c(3), n(1), 1);
        assert_eq!(edge.a, n(1));
        assert_eq!(edge.other(n(1)), Some(c(3)));
        assert_eq!(edge.other(c(3)), Some(n(1)));
        assert_eq!(edge.other(c(4)), None);
    }

    proptest! {
        #[test]
        fn prop_partitions_are_disjoint_and_cover(
            edges in prop::collection::vec((1u32..12, 1u32..12, 1u64..50), 0..40),
            isolated in prop::collection::vec(1u32..20, 0..5),
        ) {
            let mut graph = PartitionGraph::new();
            for (nucleus, cell, overlap) in &edges {
                graph.add_edge(n(*nucleus), c(*cell), *overlap).unwrap();
            }
            for spot in &isolated {
                graph.add_vertex(Vertex::new(Tier::Spot, *spot));
            }
            prop_assert!(graph.is_undirected());

            let partitions = graph.find_partitions();
            let mut covered = BTreeSet::new();
            for partition in &partitions {
                for v in &partition.vertices {
                    // disjoint: no vertex seen twice
                    prop_assert!(covered.insert(*v));
                }
                for edge in &partition.edges {
                    prop_assert!(partition.contains(edge.a) && partition.contains(edge.b));
                }
            }
            prop_assert_eq!(covered, graph.vertices().collect::<BTreeSet<_>>());
            let edge_total: usize = partitions.iter().map(|p| p.edges.len()).sum();
            prop_assert_eq!(edge_total, graph.edge_count());
        }
    }
}
