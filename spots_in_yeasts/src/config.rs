//! Assignment parameters, read from a TOML file.

use crate::error::AssignError;
use crate::regions::RegionProps;
use crate::remap::Exclusion;
use anyhow::{Context, Result};
use label_graph::TieBreak;
use log::warn;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;

/// How two tiers are considered adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdjacencyParams {
    /// Minimum contact, as a fraction of the smaller object's area.
    pub min_overlap_fraction: f64,
    /// Pixels of the owned tier also touch owners within this distance.
    /// Zero means direct overlap only.
    pub contact_radius_px: usize,
}

const DEFAULT_ADJACENCY: AdjacencyParams = AdjacencyParams {
    min_overlap_fraction: 0.1,
    contact_radius_px: 0,
};

impl Default for AdjacencyParams {
    fn default() -> Self {
        DEFAULT_ADJACENCY
    }
}

/// Shape criteria for one tier. The default accepts everything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectFilter {
    /// Smallest accepted area in pixels.
    pub min_area: usize,
    /// Largest accepted area in pixels.
    pub max_area: Option<usize>,
    /// Smallest accepted area / convex hull area.
    pub min_solidity: f64,
    /// Smallest accepted area / bounding box area.
    pub min_extent: f64,
}

impl ObjectFilter {
    /// Accepts every object.
    pub const PERMISSIVE: ObjectFilter = ObjectFilter {
        min_area: 0,
        max_area: None,
        min_solidity: 0.0,
        min_extent: 0.0,
    };

    /// First criterion `props` fails, if any.
    pub fn check(&self, props: &RegionProps) -> Option<Exclusion> {
        if props.area < self.min_area {
            Some(Exclusion::TooSmall)
        } else if self.max_area.is_some_and(|max| props.area > max) {
            Some(Exclusion::TooLarge)
        } else if props.solidity < self.min_solidity {
            Some(Exclusion::LowSolidity)
        } else if props.extent < self.min_extent {
            Some(Exclusion::LowExtent)
        } else {
            None
        }
    }

    fn validate(&self, name: &str) -> Result<(), AssignError> {
        check_fraction(&format!("{name}.min_solidity"), self.min_solidity)?;
        check_fraction(&format!("{name}.min_extent"), self.min_extent)?;
        if let Some(max_area) = self.max_area {
            if max_area < self.min_area {
                return Err(AssignError::InvalidConfig(format!(
                    "{name}.max_area = {max_area} is below {name}.min_area = {}",
                    self.min_area
                )));
            }
        }
        Ok(())
    }
}

impl Default for ObjectFilter {
    fn default() -> Self {
        ObjectFilter::PERMISSIVE
    }
}

/// Everything that tunes one field-of-view assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignConfig {
    /// Adjacency of nuclei and cells.
    pub nucleus_cell: AdjacencyParams,
    /// Adjacency of spots and nuclei.
    pub spot_nucleus: AdjacencyParams,
    /// Drop cells and nuclei whose bounding box reaches the image border.
    pub exclude_border: bool,
    /// Distance from the border that still counts as touching it.
    pub border_margin_px: usize,
    /// Candidate ordering for both matchings.
    pub tie_break: TieBreak,
    /// Spots one nucleus may own. `None` is unbounded.
    pub spots_per_nucleus: Option<NonZeroUsize>,
    /// Cells covered by nuclei beyond this fraction of their area are dropped.
    pub max_nucleus_coverage: Option<f64>,
    /// Shape criteria for cells.
    pub cell_filter: ObjectFilter,
    /// Shape criteria for nuclei.
    pub nucleus_filter: ObjectFilter,
    /// Shape criteria for spots.
    pub spot_filter: ObjectFilter,
    /// Lattice size of the spot uniformity test.
    pub uniformity_grid: usize,
}

/// Values used for every key missing from the parameters file.
pub const DEFAULT_CONFIG: AssignConfig = AssignConfig {
    nucleus_cell: DEFAULT_ADJACENCY,
    spot_nucleus: DEFAULT_ADJACENCY,
    exclude_border: true,
    border_margin_px: 0,
    tie_break: TieBreak::LowestLabel,
    spots_per_nucleus: None,
    max_nucleus_coverage: Some(0.5),
    cell_filter: ObjectFilter::PERMISSIVE,
    nucleus_filter: ObjectFilter::PERMISSIVE,
    spot_filter: ObjectFilter::PERMISSIVE,
    uniformity_grid: 50,
};

impl Default for AssignConfig {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

macro_rules! warn_non_default {
    ($config:expr, $($field:ident),+ $(,)?) => {
        $(
            if DEFAULT_CONFIG.$field != $config.$field {
                warn!("using non-default {} = {:?}", stringify!($field), $config.$field);
            }
        )+
    };
}

fn check_fraction(name: &str, value: f64) -> Result<(), AssignError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AssignError::InvalidConfig(format!(
            "{name} = {value} is outside [0, 1]"
        )))
    }
}

impl AssignConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: AssignConfig = toml::from_str(s)?;
        config.validate()?;
        config.warn_non_default();
        Ok(config)
    }

    /// Read a parameters file.
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        Self::from_toml_str(&s).with_context(|| path.display().to_string())
    }

    /// Reject values no assignment can run with.
    pub fn validate(&self) -> Result<(), AssignError> {
        check_fraction(
            "nucleus_cell.min_overlap_fraction",
            self.nucleus_cell.min_overlap_fraction,
        )?;
        check_fraction(
            "spot_nucleus.min_overlap_fraction",
            self.spot_nucleus.min_overlap_fraction,
        )?;
        if let Some(coverage) = self.max_nucleus_coverage {
            check_fraction("max_nucleus_coverage", coverage)?;
        }
        self.cell_filter.validate("cell_filter")?;
        self.nucleus_filter.validate("nucleus_filter")?;
        self.spot_filter.validate("spot_filter")?;
        if self.uniformity_grid < 2 {
            return Err(AssignError::InvalidConfig(format!(
                "uniformity_grid = {} must be at least 2",
                self.uniformity_grid
            )));
        }
        Ok(())
    }

    fn warn_non_default(&self) {
        warn_non_default!(
            self,
            nucleus_cell,
            spot_nucleus,
            exclude_border,
            border_margin_px,
            tie_break,
            spots_per_nucleus,
            max_nucleus_coverage,
            cell_filter,
            nucleus_filter,
            spot_filter,
            uniformity_grid,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(AssignConfig::from_toml_str("").unwrap(), DEFAULT_CONFIG);
        assert_eq!(AssignConfig::default().validate(), Ok(()));
        assert_eq!(DEFAULT_CONFIG.max_nucleus_coverage, Some(0.5));
    }

    #[test]
    fn test_partial_document() {
        let config = AssignConfig::from_toml_str(
            r#"
            exclude_border = false
            tie_break = "largest_overlap"
            spots_per_nucleus = 3

            [spot_nucleus]
            contact_radius_px = 2

            [cell_filter]
            min_area = 40
            "#,
        )
        .unwrap();
        assert!(!config.exclude_border);
        assert_eq!(config.tie_break, TieBreak::LargestOverlap);
        assert_eq!(config.spots_per_nucleus, NonZeroUsize::new(3));
        assert_eq!(
            config.spot_nucleus,
            AdjacencyParams {
                min_overlap_fraction: 0.1,
                contact_radius_px: 2,
            }
        );
        assert_eq!(config.cell_filter.min_area, 40);
        assert_eq!(config.cell_filter.max_area, None);
        assert_eq!(config.nucleus_cell, DEFAULT_ADJACENCY);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AssignConfig::from_toml_str("spots_per_nucleus = 0").is_err());
        assert!(AssignConfig::from_toml_str("no_such_key = 1").is_err());
        assert!(AssignConfig::from_toml_str("[nucleus_cell]\nmin_overlap_fraction = 1.5").is_err());

        let config = AssignConfig {
            uniformity_grid: 1,
            ..AssignConfig::default()
        };
        assert!(matches!(config.validate(), Err(AssignError::InvalidConfig(_))));

        let config = AssignConfig {
            spot_filter: ObjectFilter {
                min_area: 10,
                max_area: Some(5),
                ..ObjectFilter::PERMISSIVE
            },
            ..AssignConfig::default()
        };
        assert!(matches!(config.validate(), Err(AssignError::InvalidConfig(_))));
    }

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "border_margin_px = 4").unwrap();
        let config = AssignConfig::load(file.path()).unwrap();
        assert_eq!(config.border_margin_px, 4);

        let missing = file.path().with_extension("missing");
        assert!(AssignConfig::load(&missing).is_err());
    }
}
