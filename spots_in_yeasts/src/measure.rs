//! Measurements of assigned spots.

use crate::assign::FieldAssignment;
use crate::error::AssignError;
use crate::labels::FieldLabels;
use crate::regions::BoundingBox;
use label_graph::{Label, Tier};
use ndarray::{s, ArrayView2, Ix2, SliceInfo, SliceInfoElem, Zip};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;

/// One row of the spot table. Original and new labels are both kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotMeasurement {
    /// original spot label
    pub spot: Label,
    /// spot label after relabeling
    pub new_spot: Label,
    /// original nucleus label
    pub nucleus: Label,
    /// original cell label
    pub cell: Label,
    /// cell (and nucleus) label after relabeling
    pub new_cell: Label,
    /// centroid row
    pub centroid_row: f64,
    /// centroid column
    pub centroid_col: f64,
    /// pixel count
    pub area: usize,
    /// pixel edges facing another label or the image edge
    pub perimeter: usize,
    /// mean fluorescence over the spot, when an image was given
    pub intensity_mean: Option<f64>,
    /// distance from the centroid to the closest pixel of the nucleus
    pub nucleus_distance: f64,
}

fn window(bbox: &BoundingBox) -> SliceInfo<[SliceInfoElem; 2], Ix2, Ix2> {
    s![bbox.min_row..=bbox.max_row, bbox.min_col..=bbox.max_col]
}

fn distance_to_object(
    labels: ArrayView2<'_, Label>,
    label: Label,
    bbox: &BoundingBox,
    (row, col): (f64, f64),
) -> f64 {
    let inside = (row.round() as usize, col.round() as usize);
    if labels.get(inside) == Some(&label) {
        return 0.0;
    }
    labels
        .slice(window(bbox))
        .indexed_iter()
        .filter(|&(_, &l)| l == label)
        .map(|((i, j), _)| {
            let dr = (bbox.min_row + i) as f64 - row;
            let dc = (bbox.min_col + j) as f64 - col;
            dr.hypot(dc)
        })
        .fold(f64::INFINITY, f64::min)
}

/// Measure every spot that survived the assignment, in spot order.
pub fn measure_spots(
    labels: &FieldLabels<'_>,
    assignment: &FieldAssignment,
    fluorescence: Option<ArrayView2<'_, f32>>,
) -> Result<Vec<SpotMeasurement>, AssignError> {
    if let Some(fluo) = fluorescence {
        let expected = labels.spots.dim();
        if fluo.dim() != expected {
            return Err(AssignError::ShapeMismatch {
                tier: Tier::Spot,
                expected,
                found: fluo.dim(),
            });
        }
    }
    let regions = &assignment.regions;
    let mut rows = Vec::with_capacity(assignment.associations.len());
    for row in &assignment.associations {
        let (Some(spot), Some(nucleus)) =
            (regions.spots.get(&row.spot), regions.nuclei.get(&row.nucleus))
        else {
            continue;
        };
        let intensity_mean = fluorescence.map(|fluo| {
            let mut sum = 0.0;
            Zip::from(labels.spots.slice(window(&spot.bbox)))
                .and(fluo.slice(window(&spot.bbox)))
                .for_each(|&l, &v| {
                    if l == row.spot {
                        sum += f64::from(v);
                    }
                });
            sum / spot.area as f64
        });
        rows.push(SpotMeasurement {
            spot: row.spot,
            new_spot: assignment.luts.spots.get(row.spot),
            nucleus: row.nucleus,
            cell: row.cell,
            new_cell: assignment.luts.cells.get(row.cell),
            centroid_row: spot.centroid.0,
            centroid_col: spot.centroid.1,
            area: spot.area,
            perimeter: spot.perimeter,
            intensity_mean,
            nucleus_distance: distance_to_object(
                labels.nuclei,
                row.nucleus,
                &nucleus.bbox,
                spot.centroid,
            ),
        });
    }
    Ok(rows)
}

/// Spots grouped by the new label of their cell. Kept cells without spots get an empty list.
pub fn spots_by_cell(
    assignment: &FieldAssignment,
    measurements: &[SpotMeasurement],
) -> BTreeMap<Label, Vec<SpotMeasurement>> {
    let mut by_cell: BTreeMap<Label, Vec<SpotMeasurement>> = assignment
        .luts
        .cells
        .iter()
        .filter(|&(_, new)| new > 0)
        .map(|(_, new)| (new, Vec::new()))
        .collect();
    for m in measurements {
        by_cell.entry(m.new_cell).or_default().push(m.clone());
    }
    by_cell
}

/// Chi-squared test of spot positions against a uniform spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Uniformity {
    /// test statistic
    pub chi_squared: f64,
    /// lattice cells minus one
    pub degrees_of_freedom: usize,
    /// probability of a statistic at least this large under uniformity
    pub p_value: f64,
}

impl Uniformity {
    /// Uniformity is not rejected at level `alpha`.
    pub fn is_uniform(&self, alpha: f64) -> bool {
        self.p_value > alpha
    }
}

/// Bin `points` (row, column) into a `grid` x `grid` lattice over an image of
/// `shape` and compare the counts to a uniform spread.
///
/// Returns `None` without points or with a lattice of fewer than two cells per side.
pub fn spot_uniformity(
    points: &[(f64, f64)],
    shape: (usize, usize),
    grid: usize,
) -> Option<Uniformity> {
    if points.is_empty() || grid < 2 {
        return None;
    }
    let (nrows, ncols) = (shape.0 as f64, shape.1 as f64);
    let bin = |v: f64, size: f64| ((v / size * grid as f64) as usize).min(grid - 1);
    let mut counts = vec![0usize; grid * grid];
    for &(row, col) in points {
        counts[bin(row, nrows) * grid + bin(col, ncols)] += 1;
    }
    let expected = points.len() as f64 / counts.len() as f64;
    let chi_squared: f64 = counts
        .iter()
        .map(|&n| (n as f64 - expected).powi(2) / expected)
        .sum();
    let degrees_of_freedom = counts.len() - 1;
    let p_value = ChiSquared::new(degrees_of_freedom as f64)
        .ok()?
        .sf(chi_squared);
    Some(Uniformity {
        chi_squared,
        degrees_of_freedom,
        p_value,
    })
}
