//! Contacts between the objects of two label images.
#![allow(missing_docs)]

use crate::config::AdjacencyParams;
use crate::error::AssignError;
use crate::labels::disk_offsets;
use label_graph::{Label, Overlap, PartitionGraph, TierPair, Vertex};
use log::debug;
use ndarray::ArrayView2;
use serde::Serialize;
use std::collections::BTreeMap;

/// Contact between an owned object and a candidate owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjacencyEdge {
    pub owned: Label,
    pub owner: Label,
    /// owned pixels within the contact radius of the owner
    pub overlap: Overlap,
    /// overlap over the area of the smaller of the two objects
    pub fraction: f64,
}

/// All contacts of one tier pair, sorted by `(owned, owner)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjacency {
    pub tiers: TierPair,
    pub edges: Vec<AdjacencyEdge>,
    pub owned_areas: BTreeMap<Label, Overlap>,
    pub owner_areas: BTreeMap<Label, Overlap>,
}

impl Adjacency {
    /// Graph over every object of both tiers, isolated objects included.
    pub fn to_graph(&self) -> Result<PartitionGraph, AssignError> {
        let (owned, owner) = (self.tiers.owned(), self.tiers.owner());
        let mut graph = PartitionGraph::new();
        for &label in self.owned_areas.keys() {
            graph.add_vertex(Vertex::new(owned, label));
        }
        for &label in self.owner_areas.keys() {
            graph.add_vertex(Vertex::new(owner, label));
        }
        for e in &self.edges {
            graph.add_edge(
                Vertex::new(owned, e.owned),
                Vertex::new(owner, e.owner),
                e.overlap,
            )?;
        }
        Ok(graph)
    }
}

fn areas(labels: ArrayView2<'_, Label>) -> BTreeMap<Label, Overlap> {
    let mut areas = BTreeMap::new();
    for &label in labels.iter().filter(|&&l| l > 0) {
        *areas.entry(label).or_default() += 1;
    }
    areas
}

/// Find which objects of `owned` touch which objects of `owner`.
///
/// An owned pixel touches every owner label found within `contact_radius_px`
/// of it and counts once per owner label. Contacts below
/// `min_overlap_fraction` of the smaller object's area are dropped.
pub fn build_adjacency(
    owned: ArrayView2<'_, Label>,
    owner: ArrayView2<'_, Label>,
    tiers: TierPair,
    params: &AdjacencyParams,
) -> Result<Adjacency, AssignError> {
    if owned.dim() != owner.dim() {
        return Err(AssignError::ShapeMismatch {
            tier: tiers.owned(),
            expected: owner.dim(),
            found: owned.dim(),
        });
    }
    let owned_areas = areas(owned);
    if owned_areas.is_empty() {
        return Err(AssignError::EmptyInput {
            tier: tiers.owned(),
        });
    }
    let owner_areas = areas(owner);
    if owner_areas.is_empty() {
        return Err(AssignError::EmptyInput {
            tier: tiers.owner(),
        });
    }

    let (nrows, ncols) = owner.dim();
    let offsets = disk_offsets(params.contact_radius_px);
    let mut contacts: BTreeMap<(Label, Label), Overlap> = BTreeMap::new();
    let mut touched: Vec<Label> = Vec::with_capacity(offsets.len());
    for ((row, col), &x) in owned.indexed_iter() {
        if x == 0 {
            continue;
        }
        touched.clear();
        for &(dr, dc) in &offsets {
            let (r, c) = (row as isize + dr, col as isize + dc);
            if r < 0 || c < 0 || r as usize >= nrows || c as usize >= ncols {
                continue;
            }
            let y = owner[[r as usize, c as usize]];
            if y > 0 && !touched.contains(&y) {
                touched.push(y);
                *contacts.entry((x, y)).or_default() += 1;
            }
        }
    }

    let edges: Vec<_> = contacts
        .into_iter()
        .filter_map(|((x, y), overlap)| {
            let smaller = owned_areas[&x].min(owner_areas[&y]);
            let fraction = overlap as f64 / smaller as f64;
            (fraction >= params.min_overlap_fraction).then_some(AdjacencyEdge {
                owned: x,
                owner: y,
                overlap,
                fraction,
            })
        })
        .collect();
    debug!(
        "{tiers}: {} edges between {} and {} objects",
        edges.len(),
        owned_areas.len(),
        owner_areas.len()
    );
    Ok(Adjacency {
        tiers,
        edges,
        owned_areas,
        owner_areas,
    })
}
