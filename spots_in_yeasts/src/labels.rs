//! Label arrays of one field of view and the lookup tables that relabel them.
#![allow(missing_docs)]

use crate::error::AssignError;
use itertools::{iproduct, Itertools};
use label_graph::{Label, Tier};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Segmentations of one field of view. Background is 0 in every tier.
#[derive(Debug, Clone, Copy)]
pub struct FieldLabels<'a> {
    pub spots: ArrayView2<'a, Label>,
    pub nuclei: ArrayView2<'a, Label>,
    pub cells: ArrayView2<'a, Label>,
}

impl<'a> FieldLabels<'a> {
    pub fn new(
        spots: ArrayView2<'a, Label>,
        nuclei: ArrayView2<'a, Label>,
        cells: ArrayView2<'a, Label>,
    ) -> Self {
        FieldLabels {
            spots,
            nuclei,
            cells,
        }
    }

    pub fn tier(&self, tier: Tier) -> ArrayView2<'a, Label> {
        match tier {
            Tier::Spot => self.spots,
            Tier::Nucleus => self.nuclei,
            Tier::Cell => self.cells,
        }
    }

    /// Shape shared by all tiers. The cell labels are the reference.
    pub fn shape(&self) -> Result<(usize, usize), AssignError> {
        let expected = self.cells.dim();
        for tier in [Tier::Spot, Tier::Nucleus] {
            let found = self.tier(tier).dim();
            if found != expected {
                return Err(AssignError::ShapeMismatch {
                    tier,
                    expected,
                    found,
                });
            }
        }
        Ok(expected)
    }
}

/// Foreground labels present in `labels`, ascending.
pub fn unique_labels(labels: ArrayView2<'_, Label>) -> BTreeSet<Label> {
    labels.iter().copied().filter(|&l| l > 0).collect()
}

/// Pixel offsets within a disk of `radius`, nearest first.
pub(crate) fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    iproduct!(-r..=r, -r..=r)
        .filter(|(dr, dc)| dr.pow(2) + dc.pow(2) <= r.pow(2))
        .sorted_by_key(|(dr, dc)| (dr.pow(2) + dc.pow(2), *dr, *dc))
        .collect()
}

/// Largest label a dense relabeling table is built for, whatever the object count.
const DENSE_LUT_LIMIT: usize = 1 << 16;

/// Old label -> new label of one tier. A new label of 0 discards the object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelLut(BTreeMap<Label, Label>);

impl LabelLut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: Label, new: Label) {
        self.0.insert(old, new);
    }

    /// New label of `old`; unknown labels and background map to 0.
    pub fn get(&self, old: Label) -> Label {
        self.0.get(&old).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, Label)> + '_ {
        self.0.iter().map(|(&old, &new)| (old, new))
    }

    /// Old labels that survive.
    pub fn kept(&self) -> impl Iterator<Item = Label> + '_ {
        self.iter().filter(|&(_, new)| new > 0).map(|(old, _)| old)
    }

    /// Relabel a whole array into a new allocation.
    ///
    /// Small label ranges go through a dense table; sparse or huge labels are
    /// looked up in the map.
    pub fn apply(&self, labels: ArrayView2<'_, Label>) -> Array2<Label> {
        let Some(&max_old) = self.0.keys().next_back() else {
            return Array2::zeros(labels.raw_dim());
        };
        let max_old = max_old as usize;
        if max_old > DENSE_LUT_LIMIT.max(4 * self.0.len()) {
            return labels.mapv(|old| self.get(old));
        }
        let mut dense = vec![0; max_old + 1];
        for (old, new) in self.iter() {
            dense[old as usize] = new;
        }
        labels.mapv(|old| dense.get(old as usize).copied().unwrap_or(0))
    }
}
