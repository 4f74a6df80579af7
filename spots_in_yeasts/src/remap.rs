//! Turn matchings into unified labels.
//!
//! A kept cell and its nucleus share one new label so the relabeled images
//! can be overlaid directly. Spots are numbered on their own.

use crate::config::{AssignConfig, ObjectFilter};
use crate::labels::{FieldLabels, LabelLut};
use crate::regions::{RegionProps, TierRegions};
use label_graph::{Label, Matching, Tier, Vertex};
use ndarray::{Array2, Zip};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why an object is missing from the relabeled images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// no counterpart in the matching
    Unmatched,
    /// bounding box reaches the image border
    Border,
    /// below the minimum area
    TooSmall,
    /// above the maximum area
    TooLarge,
    /// below the minimum solidity
    LowSolidity,
    /// below the minimum extent
    LowExtent,
    /// cell mostly covered by nuclei
    NucleusCoverage,
    /// matched, but the object it was matched with was dropped
    PartnerExcluded,
}

/// An object that did not survive, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ExcludedObject {
    /// the dropped object
    pub vertex: Vertex,
    /// first reason it failed
    pub reason: Exclusion,
}

/// One spot resolved to its nucleus and cell, in original labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AssociationRow {
    /// spot label
    pub spot: Label,
    /// nucleus label
    pub nucleus: Label,
    /// cell label
    pub cell: Label,
}

/// Follow spot -> nucleus -> cell. Spots whose nucleus has no cell are left out.
pub fn compose(spot_nucleus: &Matching, nucleus_cell: &Matching) -> Vec<AssociationRow> {
    let cell_of = nucleus_cell.owner_map();
    spot_nucleus
        .pairs
        .iter()
        .filter_map(|&(spot, nucleus)| {
            cell_of.get(&nucleus.label).map(|&cell| AssociationRow {
                spot: spot.label,
                nucleus: nucleus.label,
                cell,
            })
        })
        .collect()
}

/// Lookup tables of all three tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierLuts {
    /// spot relabeling
    pub spots: LabelLut,
    /// nucleus relabeling, shared with the cells
    pub nuclei: LabelLut,
    /// cell relabeling
    pub cells: LabelLut,
}

/// Relabeled images of one field of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelabeledField {
    /// spots numbered 1..m
    pub spots: Array2<Label>,
    /// nuclei carrying their cell's new label
    pub nuclei: Array2<Label>,
    /// cells numbered 1..n
    pub cells: Array2<Label>,
}

impl RelabeledField {
    /// All background.
    pub fn empty(shape: (usize, usize)) -> Self {
        RelabeledField {
            spots: Array2::zeros(shape),
            nuclei: Array2::zeros(shape),
            cells: Array2::zeros(shape),
        }
    }
}

/// Output of [remap].
#[derive(Debug, Clone, PartialEq)]
pub struct Remapped {
    /// per-tier lookup tables
    pub luts: TierLuts,
    /// lookup tables applied to the input images
    pub relabeled: RelabeledField,
    /// surviving spots, sorted by spot
    pub associations: Vec<AssociationRow>,
    /// dropped objects, sorted by vertex
    pub excluded: Vec<ExcludedObject>,
}

/// Pixels of each cell that also belong to some nucleus.
pub fn nucleus_coverage(labels: &FieldLabels<'_>) -> BTreeMap<Label, usize> {
    let mut covered = BTreeMap::new();
    Zip::from(labels.cells)
        .and(labels.nuclei)
        .for_each(|&cell, &nucleus| {
            if cell > 0 && nucleus > 0 {
                *covered.entry(cell).or_default() += 1;
            }
        });
    covered
}

struct Screen<'a> {
    shape: (usize, usize),
    config: &'a AssignConfig,
}

impl Screen<'_> {
    fn check(&self, props: Option<&RegionProps>, filter: &ObjectFilter) -> Option<Exclusion> {
        let props = props?;
        if self.config.exclude_border
            && props.touches_border(self.shape, self.config.border_margin_px)
        {
            return Some(Exclusion::Border);
        }
        filter.check(props)
    }
}

/// Build the unified lookup tables and apply them.
///
/// Filters run on matched objects only and never change the matching itself:
/// a cell is kept when it has a nucleus and neither fails a filter, and a spot
/// is kept when its nucleus is kept and the spot passes its own filter.
pub fn remap(
    labels: &FieldLabels<'_>,
    regions: &TierRegions,
    spot_nucleus: &Matching,
    nucleus_cell: &Matching,
    config: &AssignConfig,
) -> Remapped {
    let screen = Screen {
        shape: labels.cells.dim(),
        config,
    };
    let coverage = nucleus_coverage(labels);
    let nucleus_of: BTreeMap<Label, Label> = nucleus_cell
        .pairs
        .iter()
        .map(|&(nucleus, cell)| (cell.label, nucleus.label))
        .collect();

    let mut luts = TierLuts::default();
    let mut excluded = Vec::new();
    let mut next_label = 0;
    for (&cell, props) in &regions.cells {
        let reason = match nucleus_of.get(&cell) {
            None => Some(Exclusion::Unmatched),
            Some(&nucleus) => screen
                .check(Some(props), &config.cell_filter)
                .or_else(|| {
                    let covered = coverage.get(&cell).copied().unwrap_or(0);
                    config
                        .max_nucleus_coverage
                        .filter(|&max| covered as f64 > max * props.area as f64)
                        .map(|_| Exclusion::NucleusCoverage)
                })
                .or_else(|| {
                    screen
                        .check(regions.nuclei.get(&nucleus), &config.nucleus_filter)
                        .map(|_| Exclusion::PartnerExcluded)
                }),
        };
        match reason {
            Some(reason) => {
                luts.cells.insert(cell, 0);
                excluded.push(ExcludedObject {
                    vertex: Vertex::cell(cell),
                    reason,
                });
            }
            None => {
                next_label += 1;
                luts.cells.insert(cell, next_label);
                if let Some(&nucleus) = nucleus_of.get(&cell) {
                    luts.nuclei.insert(nucleus, next_label);
                }
            }
        }
    }

    for (&nucleus, props) in &regions.nuclei {
        if luts.nuclei.get(nucleus) > 0 {
            continue;
        }
        let reason = match nucleus_cell.owner_of(Vertex::nucleus(nucleus)) {
            None => Exclusion::Unmatched,
            Some(_) => screen
                .check(Some(props), &config.nucleus_filter)
                .unwrap_or(Exclusion::PartnerExcluded),
        };
        luts.nuclei.insert(nucleus, 0);
        excluded.push(ExcludedObject {
            vertex: Vertex::nucleus(nucleus),
            reason,
        });
    }

    let rows: BTreeMap<Label, AssociationRow> = compose(spot_nucleus, nucleus_cell)
        .into_iter()
        .map(|row| (row.spot, row))
        .collect();
    let mut associations = Vec::new();
    let mut next_spot = 0;
    for (&spot, props) in &regions.spots {
        let reason = match spot_nucleus.owner_of(Vertex::spot(spot)) {
            None => Some(Exclusion::Unmatched),
            Some(nucleus) if luts.nuclei.get(nucleus.label) == 0 => {
                Some(Exclusion::PartnerExcluded)
            }
            Some(_) => screen.check(Some(props), &config.spot_filter),
        };
        match (reason, rows.get(&spot)) {
            (None, Some(&row)) => {
                next_spot += 1;
                luts.spots.insert(spot, next_spot);
                associations.push(row);
            }
            (reason, _) => {
                luts.spots.insert(spot, 0);
                excluded.push(ExcludedObject {
                    vertex: Vertex::spot(spot),
                    reason: reason.unwrap_or(Exclusion::PartnerExcluded),
                });
            }
        }
    }
    excluded.sort_unstable();

    let relabeled = RelabeledField {
        spots: luts.spots.apply(labels.spots),
        nuclei: luts.nuclei.apply(labels.nuclei),
        cells: luts.cells.apply(labels.cells),
    };
    Remapped {
        luts,
        relabeled,
        associations,
        excluded,
    }
}

/// Count of dropped objects per tier and reason.
pub fn exclusion_counts(excluded: &[ExcludedObject]) -> BTreeMap<(Tier, Exclusion), usize> {
    let mut counts = BTreeMap::new();
    for e in excluded {
        *counts.entry((e.vertex.tier, e.reason)).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn matching(pairs: &[(Vertex, Vertex)], unmatched: &[Vertex]) -> Matching {
        Matching {
            pairs: pairs.to_vec(),
            unmatched: unmatched.to_vec(),
        }
    }

    #[test]
    fn test_compose() {
        let spot_nucleus = matching(
            &[
                (Vertex::spot(1), Vertex::nucleus(10)),
                (Vertex::spot(2), Vertex::nucleus(20)),
                (Vertex::spot(3), Vertex::nucleus(30)),
            ],
            &[],
        );
        let nucleus_cell = matching(
            &[
                (Vertex::nucleus(10), Vertex::cell(100)),
                (Vertex::nucleus(20), Vertex::cell(200)),
            ],
            &[Vertex::nucleus(30)],
        );
        assert_eq!(
            compose(&spot_nucleus, &nucleus_cell),
            vec![
                AssociationRow {
                    spot: 1,
                    nucleus: 10,
                    cell: 100
                },
                AssociationRow {
                    spot: 2,
                    nucleus: 20,
                    cell: 200
                },
            ]
        );
    }

    /// Two cells away from the border, each with one nucleus and one spot.
    fn field() -> (Array2<Label>, Array2<Label>, Array2<Label>) {
        let cells = array![
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 7, 7, 7, 0, 9, 9, 0],
            [0, 7, 7, 7, 0, 9, 9, 0],
            [0, 7, 7, 7, 0, 9, 9, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
        ];
        let nuclei = array![
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 3, 0, 0, 0, 5, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
        ];
        let spots = nuclei.mapv(|n| if n == 3 { 8 } else if n == 5 { 4 } else { 0 });
        (spots, nuclei, cells)
    }

    fn matchings() -> (Matching, Matching) {
        let spot_nucleus = matching(
            &[
                (Vertex::spot(4), Vertex::nucleus(5)),
                (Vertex::spot(8), Vertex::nucleus(3)),
            ],
            &[],
        );
        let nucleus_cell = matching(
            &[
                (Vertex::nucleus(3), Vertex::cell(7)),
                (Vertex::nucleus(5), Vertex::cell(9)),
            ],
            &[],
        );
        (spot_nucleus, nucleus_cell)
    }

    #[test]
    fn test_unified_labels() {
        let (spots, nuclei, cells) = field();
        let labels = FieldLabels::new(spots.view(), nuclei.view(), cells.view());
        let regions = TierRegions::measure(&labels);
        let (spot_nucleus, nucleus_cell) = matchings();
        let out = remap(
            &labels,
            &regions,
            &spot_nucleus,
            &nucleus_cell,
            &AssignConfig::default(),
        );
        assert_eq!(out.luts.cells.iter().collect::<Vec<_>>(), vec![(7, 1), (9, 2)]);
        assert_eq!(out.luts.nuclei.iter().collect::<Vec<_>>(), vec![(3, 1), (5, 2)]);
        assert_eq!(out.luts.spots.iter().collect::<Vec<_>>(), vec![(4, 1), (8, 2)]);
        assert_eq!(out.relabeled.nuclei[[2, 2]], out.relabeled.cells[[2, 2]]);
        assert_eq!(out.relabeled.nuclei[[2, 6]], 2);
        assert_eq!(out.relabeled.spots[[2, 2]], 2);
        assert!(out.excluded.is_empty());
        assert_eq!(
            out.associations,
            vec![
                AssociationRow {
                    spot: 4,
                    nucleus: 5,
                    cell: 9
                },
                AssociationRow {
                    spot: 8,
                    nucleus: 3,
                    cell: 7
                },
            ]
        );
    }

    #[test]
    fn test_border_cell_takes_its_nucleus_and_spot() {
        let (spots, nuclei, mut cells) = field();
        cells[[1, 7]] = 9;
        let labels = FieldLabels::new(spots.view(), nuclei.view(), cells.view());
        let regions = TierRegions::measure(&labels);
        let (spot_nucleus, nucleus_cell) = matchings();
        let out = remap(
            &labels,
            &regions,
            &spot_nucleus,
            &nucleus_cell,
            &AssignConfig::default(),
        );
        assert_eq!(out.luts.cells.iter().collect::<Vec<_>>(), vec![(7, 1), (9, 0)]);
        assert_eq!(out.luts.nuclei.get(5), 0);
        assert_eq!(out.luts.spots.iter().collect::<Vec<_>>(), vec![(4, 0), (8, 1)]);
        assert!(out.relabeled.cells.iter().all(|&l| l <= 1));
        assert_eq!(
            out.excluded,
            vec![
                ExcludedObject {
                    vertex: Vertex::spot(4),
                    reason: Exclusion::PartnerExcluded,
                },
                ExcludedObject {
                    vertex: Vertex::nucleus(5),
                    reason: Exclusion::PartnerExcluded,
                },
                ExcludedObject {
                    vertex: Vertex::cell(9),
                    reason: Exclusion::Border,
                },
            ]
        );

        let keep_border = AssignConfig {
            exclude_border: false,
            ..AssignConfig::default()
        };
        let out = remap(&labels, &regions, &spot_nucleus, &nucleus_cell, &keep_border);
        assert_eq!(out.luts.cells.kept().count(), 2);
    }

    #[test]
    fn test_coverage_and_shape_filters() {
        let (spots, mut nuclei, cells) = field();
        // nucleus 5 now fills all of cell 9
        for r in 1..4 {
            for c in 5..7 {
                nuclei[[r, c]] = 5;
            }
        }
        let labels = FieldLabels::new(spots.view(), nuclei.view(), cells.view());
        let regions = TierRegions::measure(&labels);
        let (spot_nucleus, nucleus_cell) = matchings();
        let out = remap(
            &labels,
            &regions,
            &spot_nucleus,
            &nucleus_cell,
            &AssignConfig::default(),
        );
        assert_eq!(
            exclusion_counts(&out.excluded).get(&(Tier::Cell, Exclusion::NucleusCoverage)),
            Some(&1)
        );

        let strict = AssignConfig {
            max_nucleus_coverage: None,
            spot_filter: ObjectFilter {
                min_area: 2,
                ..ObjectFilter::PERMISSIVE
            },
            ..AssignConfig::default()
        };
        let out = remap(&labels, &regions, &spot_nucleus, &nucleus_cell, &strict);
        assert_eq!(out.luts.cells.kept().count(), 2);
        assert!(out.luts.spots.kept().next().is_none());
        assert!(out.associations.is_empty());
        assert_eq!(
            exclusion_counts(&out.excluded),
            BTreeMap::from([((Tier::Spot, Exclusion::TooSmall), 2)])
        );
    }

    #[test]
    fn test_unmatched() {
        let (spots, nuclei, cells) = field();
        let labels = FieldLabels::new(spots.view(), nuclei.view(), cells.view());
        let regions = TierRegions::measure(&labels);
        let spot_nucleus = matching(&[], &[Vertex::spot(4), Vertex::spot(8)]);
        let nucleus_cell = matching(
            &[(Vertex::nucleus(3), Vertex::cell(7))],
            &[Vertex::nucleus(5), Vertex::cell(9)],
        );
        let out = remap(
            &labels,
            &regions,
            &spot_nucleus,
            &nucleus_cell,
            &AssignConfig::default(),
        );
        assert_eq!(out.luts.cells.iter().collect::<Vec<_>>(), vec![(7, 1), (9, 0)]);
        assert!(out
            .excluded
            .iter()
            .all(|e| e.reason == Exclusion::Unmatched));
        assert_eq!(out.excluded.len(), 4);
    }
}
