//! spots_in_yeasts
//!
//! Assigns fluorescent spots to nuclei and nuclei to cells in segmented
//! microscopy fields of view, then relabels all three tiers consistently.
//!
#![deny(missing_docs)]

pub mod adjacency;
pub mod assign;
pub mod config;
mod error;
pub mod labels;
pub mod measure;
pub mod regions;
pub mod remap;
pub mod render;

pub use adjacency::{build_adjacency, Adjacency, AdjacencyEdge};
pub use assign::{assign_field, FieldAssignment, FieldOutcome, FieldSummary, PairSummary};
pub use config::{AdjacencyParams, AssignConfig, ObjectFilter, DEFAULT_CONFIG};
pub use error::AssignError;
pub use labels::{FieldLabels, LabelLut};
pub use measure::{measure_spots, spot_uniformity, spots_by_cell, SpotMeasurement, Uniformity};
pub use regions::{region_props, BoundingBox, RegionProps, TierRegions};
pub use remap::{compose, remap, AssociationRow, ExcludedObject, Exclusion, TierLuts};
pub use render::{outlines, random_color_lut};

pub use label_graph::{Label, Tier, TieBreak, Vertex};
