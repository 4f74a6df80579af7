use crate::graph::{Overlap, Partition};
use crate::tier::{Label, TierPair, Vertex};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;

/// Order in which candidate owners are offered to an owned object.
///
/// Hopcroft-Karp returns one maximum matching among possibly many; fixing the
/// candidate order before it runs makes that choice reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// smallest owner label first
    #[default]
    LowestLabel,
    /// largest overlap first, then smallest owner label
    LargestOverlap,
}

/// How one tier is matched onto another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingRules {
    /// owned and owner tiers
    pub tiers: TierPair,
    /// how many owned objects one owner may hold; `None` is unbounded
    pub owner_capacity: Option<NonZeroUsize>,
    /// candidate ordering
    pub tie_break: TieBreak,
}

impl MatchingRules {
    /// One-to-one matching with the default tie break.
    pub fn one_to_one(tiers: TierPair) -> Self {
        MatchingRules {
            tiers,
            owner_capacity: NonZeroUsize::new(1),
            tie_break: TieBreak::default(),
        }
    }
}

/// Result of matching one or more partitions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Matching {
    /// `(owned, owner)` pairs sorted by owned vertex
    pub pairs: Vec<(Vertex, Vertex)>,
    /// vertices left without a counterpart, sorted
    pub unmatched: Vec<Vertex>,
}

impl Matching {
    /// Number of matched pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// No pair at all.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Owner assigned to `owned`.
    pub fn owner_of(&self, owned: Vertex) -> Option<Vertex> {
        self.pairs
            .binary_search_by_key(&owned, |&(o, _)| o)
            .ok()
            .map(|i| self.pairs[i].1)
    }

    /// Owned label -> owner label.
    pub fn owner_map(&self) -> BTreeMap<Label, Label> {
        self.pairs
            .iter()
            .map(|(owned, owner)| (owned.label, owner.label))
            .collect()
    }

    /// Concatenate per-partition results. Partitions are disjoint so nothing collides.
    pub fn merge(parts: impl IntoIterator<Item = Matching>) -> Matching {
        let mut merged = Matching::default();
        for part in parts {
            merged.pairs.extend(part.pairs);
            merged.unmatched.extend(part.unmatched);
        }
        merged.pairs.sort_unstable();
        merged.unmatched.sort_unstable();
        merged
    }
}

/// Match every partition independently and merge the results.
pub fn match_partitions(partitions: &[Partition], rules: &MatchingRules) -> Matching {
    Matching::merge(partitions.iter().map(|p| hopcroft_karp(p, rules)))
}

/// Maximum cardinality matching of the owned tier onto the owner tier of one partition.
///
/// Each owned vertex is matched at most once and each owner at most
/// `owner_capacity` times. Owners with a capacity above one are expanded into
/// slots before the search. Vertices of any other tier are reported unmatched.
pub fn hopcroft_karp(partition: &Partition, rules: &MatchingRules) -> Matching {
    let (owned_tier, owner_tier) = (rules.tiers.owned(), rules.tiers.owner());
    let owned: Vec<Vertex> = partition
        .vertices
        .iter()
        .copied()
        .filter(|v| v.tier == owned_tier)
        .collect();
    let owners: Vec<Vertex> = partition
        .vertices
        .iter()
        .copied()
        .filter(|v| v.tier == owner_tier)
        .collect();
    let owned_index: HashMap<Vertex, usize> =
        owned.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let owner_index: HashMap<Vertex, usize> =
        owners.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut candidates: Vec<Vec<(usize, Overlap)>> = vec![Vec::new(); owned.len()];
    for edge in &partition.edges {
        let oriented = if edge.a.tier == owned_tier && edge.b.tier == owner_tier {
            Some((edge.a, edge.b))
        } else if edge.b.tier == owned_tier && edge.a.tier == owner_tier {
            Some((edge.b, edge.a))
        } else {
            None
        };
        if let Some((u, o)) = oriented {
            candidates[owned_index[&u]].push((owner_index[&o], edge.overlap));
        }
    }
    // owners are sorted by label, so their index orders them by label too
    for list in &mut candidates {
        match rules.tie_break {
            TieBreak::LowestLabel => list.sort_unstable_by_key(|&(o, _)| o),
            TieBreak::LargestOverlap => {
                list.sort_unstable_by_key(|&(o, overlap)| (Reverse(overlap), o));
            }
        }
    }

    // owner i occupies slots first_slot[i]..first_slot[i + 1]
    let mut degree = vec![0usize; owners.len()];
    for &(o, _) in candidates.iter().flatten() {
        degree[o] += 1;
    }
    let mut first_slot = Vec::with_capacity(owners.len() + 1);
    let mut slot_owner = Vec::new();
    first_slot.push(0);
    for (o, &d) in degree.iter().enumerate() {
        let slots = rules.owner_capacity.map_or(d, |cap| d.min(cap.get()));
        slot_owner.extend(std::iter::repeat_n(o, slots));
        first_slot.push(slot_owner.len());
    }
    let adjacency: Vec<Vec<usize>> = candidates
        .iter()
        .map(|list| {
            list.iter()
                .flat_map(|&(o, _)| first_slot[o]..first_slot[o + 1])
                .collect()
        })
        .collect();

    let assignment = HopcroftKarp::new(&adjacency, slot_owner.len()).run();

    let mut matching = Matching::default();
    let mut owner_used = vec![false; owners.len()];
    for (u, slot) in assignment.into_iter().enumerate() {
        if slot == UNSET {
            matching.unmatched.push(owned[u]);
        } else {
            let o = slot_owner[slot];
            owner_used[o] = true;
            matching.pairs.push((owned[u], owners[o]));
        }
    }
    matching.unmatched.extend(
        owners
            .iter()
            .zip_eq(&owner_used)
            .filter(|(_, &used)| !used)
            .map(|(&o, _)| o),
    );
    matching.unmatched.extend(
        partition
            .vertices
            .iter()
            .filter(|v| v.tier != owned_tier && v.tier != owner_tier),
    );
    matching.pairs.sort_unstable();
    matching.unmatched.sort_unstable();
    matching
}

const UNSET: usize = usize::MAX;
const INF: usize = usize::MAX;

/// Hopcroft-Karp over a bipartite graph given as left -> right adjacency lists.
struct HopcroftKarp<'a> {
    adjacency: &'a [Vec<usize>],
    left_pair: Vec<usize>,
    right_pair: Vec<usize>,
    level: Vec<usize>,
}

impl<'a> HopcroftKarp<'a> {
    fn new(adjacency: &'a [Vec<usize>], n_right: usize) -> Self {
        HopcroftKarp {
            adjacency,
            left_pair: vec![UNSET; adjacency.len()],
            right_pair: vec![UNSET; n_right],
            level: vec![INF; adjacency.len()],
        }
    }

    /// Right vertex matched to each left vertex, `UNSET` when free.
    fn run(mut self) -> Vec<usize> {
        while let Some(limit) = self.build_levels() {
            for u in 0..self.adjacency.len() {
                if self.left_pair[u] == UNSET {
                    self.augment(u, limit);
                }
            }
        }
        self.left_pair
    }

    /// Layer left vertices by alternating-path distance from the free ones.
    /// Returns the level from which a free right vertex is reachable, i.e. the
    /// length of the shortest augmenting paths, or `None` when there are none.
    fn build_levels(&mut self) -> Option<usize> {
        let mut queue = VecDeque::new();
        for u in 0..self.adjacency.len() {
            if self.left_pair[u] == UNSET {
                self.level[u] = 0;
                queue.push_back(u);
            } else {
                self.level[u] = INF;
            }
        }
        let mut limit = INF;
        while let Some(u) = queue.pop_front() {
            if self.level[u] > limit {
                continue;
            }
            for &v in &self.adjacency[u] {
                let w = self.right_pair[v];
                if w == UNSET {
                    limit = limit.min(self.level[u]);
                } else if self.level[w] == INF {
                    self.level[w] = self.level[u] + 1;
                    queue.push_back(w);
                }
            }
        }
        (limit != INF).then_some(limit)
    }

    /// Search a shortest augmenting path from the free vertex `root` with an
    /// explicit stack of `(left vertex, next edge)` frames and flip it.
    fn augment(&mut self, root: usize, limit: usize) -> bool {
        let mut stack = vec![(root, 0usize)];
        while let Some(frame) = stack.last_mut() {
            let (u, cursor) = *frame;
            let Some(&v) = self.adjacency[u].get(cursor) else {
                // dead end for the rest of this phase
                self.level[u] = INF;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let w = self.right_pair[v];
            if w == UNSET {
                if self.level[u] == limit {
                    // every frame's last tried edge lies on the path
                    for &(fu, fc) in &stack {
                        let fv = self.adjacency[fu][fc - 1];
                        self.left_pair[fu] = fv;
                        self.right_pair[fv] = fu;
                    }
                    return true;
                }
            } else if self.level[w] != INF && self.level[w] == self.level[u] + 1 {
                stack.push((w, 0));
            }
        }
        false
    }
}
