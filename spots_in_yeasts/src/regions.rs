//! Per-object shape measurements of a label image.

use crate::labels::FieldLabels;
use geo::{Area, ConvexHull, MultiPoint, Point};
use label_graph::{Label, Tier};
use ndarray::ArrayView2;
use serde::Serialize;
use std::collections::BTreeMap;

/// Inclusive pixel bounds of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    /// first row
    pub min_row: usize,
    /// first column
    pub min_col: usize,
    /// last row
    pub max_row: usize,
    /// last column
    pub max_col: usize,
}

impl BoundingBox {
    fn pixel(row: usize, col: usize) -> Self {
        BoundingBox {
            min_row: row,
            min_col: col,
            max_row: row,
            max_col: col,
        }
    }

    fn extend(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }

    /// Number of pixels covered by the box.
    pub fn area(&self) -> usize {
        (self.max_row - self.min_row + 1) * (self.max_col - self.min_col + 1)
    }

    /// True when the box comes within `margin` pixels of any image edge.
    pub fn touches_border(&self, shape: (usize, usize), margin: usize) -> bool {
        let (nrows, ncols) = shape;
        self.min_row <= margin
            || self.min_col <= margin
            || self.max_row + margin + 1 >= nrows
            || self.max_col + margin + 1 >= ncols
    }
}

/// Shape of one labeled object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionProps {
    /// label of the object
    pub label: Label,
    /// pixel count
    pub area: usize,
    /// pixel bounds
    pub bbox: BoundingBox,
    /// mean (row, column) of the pixels
    pub centroid: (f64, f64),
    /// pixel edges facing another label or the image edge
    pub perimeter: usize,
    /// area over convex hull area
    pub solidity: f64,
    /// area over bounding box area
    pub extent: f64,
}

impl RegionProps {
    /// See [BoundingBox::touches_border].
    pub fn touches_border(&self, shape: (usize, usize), margin: usize) -> bool {
        self.bbox.touches_border(shape, margin)
    }
}

struct Accumulator {
    area: usize,
    row_sum: usize,
    col_sum: usize,
    bbox: BoundingBox,
    perimeter: usize,
    corners: Vec<(usize, usize)>,
}

impl Accumulator {
    fn finish(mut self, label: Label) -> RegionProps {
        self.corners.sort_unstable();
        self.corners.dedup();
        let hull = MultiPoint::new(
            self.corners
                .iter()
                .map(|&(row, col)| Point::new(col as f64, row as f64))
                .collect(),
        )
        .convex_hull();
        let hull_area = hull.unsigned_area();
        let area = self.area as f64;
        RegionProps {
            label,
            area: self.area,
            bbox: self.bbox,
            centroid: (
                self.row_sum as f64 / area,
                self.col_sum as f64 / area,
            ),
            perimeter: self.perimeter,
            solidity: if hull_area > 0.0 {
                (area / hull_area).min(1.0)
            } else {
                1.0
            },
            extent: area / self.bbox.area() as f64,
        }
    }
}

/// Measure every foreground object of `labels`, keyed by label.
pub fn region_props(labels: ArrayView2<'_, Label>) -> BTreeMap<Label, RegionProps> {
    let (nrows, ncols) = labels.dim();
    let mut acc: BTreeMap<Label, Accumulator> = BTreeMap::new();
    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let differs = |r: Option<usize>, c: Option<usize>| match (r, c) {
            (Some(r), Some(c)) if r < nrows && c < ncols => labels[[r, c]] != label,
            _ => true,
        };
        let edges = [
            differs(row.checked_sub(1), Some(col)),
            differs(Some(row + 1), Some(col)),
            differs(Some(row), col.checked_sub(1)),
            differs(Some(row), Some(col + 1)),
        ]
        .into_iter()
        .filter(|&d| d)
        .count();

        let entry = acc.entry(label).or_insert_with(|| Accumulator {
            area: 0,
            row_sum: 0,
            col_sum: 0,
            bbox: BoundingBox::pixel(row, col),
            perimeter: 0,
            corners: Vec::new(),
        });
        entry.area += 1;
        entry.row_sum += row;
        entry.col_sum += col;
        entry.bbox.extend(row, col);
        entry.perimeter += edges;
        // interior pixels never lie on the hull
        if edges > 0 {
            entry.corners.extend([
                (row, col),
                (row + 1, col),
                (row, col + 1),
                (row + 1, col + 1),
            ]);
        }
    }
    acc.into_iter()
        .map(|(label, a)| (label, a.finish(label)))
        .collect()
}

/// Region properties of all three tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierRegions {
    /// spot shapes
    pub spots: BTreeMap<Label, RegionProps>,
    /// nucleus shapes
    pub nuclei: BTreeMap<Label, RegionProps>,
    /// cell shapes
    pub cells: BTreeMap<Label, RegionProps>,
}

impl TierRegions {
    /// Measure every tier of a field of view.
    pub fn measure(labels: &FieldLabels<'_>) -> Self {
        TierRegions {
            spots: region_props(labels.spots),
            nuclei: region_props(labels.nuclei),
            cells: region_props(labels.cells),
        }
    }

    /// Shapes of one tier.
    pub fn tier(&self, tier: Tier) -> &BTreeMap<Label, RegionProps> {
        match tier {
            Tier::Spot => &self.spots,
            Tier::Nucleus => &self.nuclei,
            Tier::Cell => &self.cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s, Array2};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_square() {
        let mut labels = Array2::<Label>::zeros((6, 6));
        labels.slice_mut(s![1..4, 2..5]).fill(5);
        let props = region_props(labels.view());
        assert_eq!(props.len(), 1);
        let square = &props[&5];
        assert_eq!(square.area, 9);
        assert_eq!(
            square.bbox,
            BoundingBox {
                min_row: 1,
                min_col: 2,
                max_row: 3,
                max_col: 4,
            }
        );
        assert_eq!(square.centroid, (2.0, 3.0));
        assert_eq!(square.perimeter, 12);
        assert!((square.solidity - 1.0).abs() < 1e-12);
        assert!((square.extent - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_l_shape() {
        // X X
        // X .
        let labels = array![[1, 1], [1, 0]];
        let l = &region_props(labels.view())[&1];
        assert_eq!(l.area, 3);
        assert_eq!(l.perimeter, 8);
        assert!((l.extent - 0.75).abs() < 1e-12);
        // hull of the corners cuts the missing pixel in half
        assert!((l.solidity - 3.0 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_neighbouring_labels_share_edges() {
        let labels = array![[1, 2]];
        let props = region_props(labels.view());
        assert_eq!(props[&1].perimeter, 4);
        assert_eq!(props[&2].perimeter, 4);
        assert!((props[&2].solidity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_touches_border() {
        let bbox = BoundingBox {
            min_row: 2,
            min_col: 3,
            max_row: 5,
            max_col: 6,
        };
        assert!(!bbox.touches_border((10, 10), 0));
        assert!(!bbox.touches_border((10, 10), 1));
        assert!(bbox.touches_border((10, 10), 2));
        assert!(bbox.touches_border((6, 10), 0));
        assert!(bbox.touches_border((10, 7), 0));
        assert!(BoundingBox::pixel(0, 4).touches_border((10, 10), 0));
        assert!(BoundingBox::pixel(4, 0).touches_border((10, 10), 0));
        assert!(!BoundingBox::pixel(4, 1).touches_border((10, 10), 0));
    }
}
