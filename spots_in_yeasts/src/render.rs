//! Helpers to display label images.

use crate::labels::disk_offsets;
use label_graph::Label;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

/// RGB colors for `slots` labels. Slot 0 is black, the others are random.
///
/// The caller owns the generator, so a seeded one gives the same table every time.
pub fn random_color_lut<R: Rng + ?Sized>(rng: &mut R, slots: usize) -> Vec<[f32; 3]> {
    (0..slots)
        .map(|i| {
            if i == 0 {
                [0.0; 3]
            } else {
                [
                    rng.random_range(0.01..1.0),
                    rng.random_range(0.01..1.0),
                    rng.random_range(0.01..1.0),
                ]
            }
        })
        .collect()
}

/// Pixels at the edge of an object: the maximum label within `thickness`
/// of the pixel exceeds its own label.
pub fn outlines(labels: ArrayView2<'_, Label>, thickness: usize) -> Array2<bool> {
    let (nrows, ncols) = labels.dim();
    let offsets = disk_offsets(thickness);
    Array2::from_shape_fn((nrows, ncols), |(row, col)| {
        let own = labels[[row, col]];
        offsets.iter().any(|&(dr, dc)| {
            let (r, c) = (row as isize + dr, col as isize + dc);
            r >= 0
                && c >= 0
                && (r as usize) < nrows
                && (c as usize) < ncols
                && labels[[r as usize, c as usize]] > own
        })
    })
}
