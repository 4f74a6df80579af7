//! Assignment of one field of view.

use crate::adjacency::{build_adjacency, Adjacency};
use crate::config::AssignConfig;
use crate::error::AssignError;
use crate::labels::FieldLabels;
use crate::regions::TierRegions;
use crate::remap::{
    exclusion_counts, remap, AssociationRow, ExcludedObject, Exclusion, RelabeledField, TierLuts,
};
use label_graph::{match_partitions, Matching, MatchingRules, Tier, TierPair, Vertex};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

/// Whether anything could be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    /// matching ran
    Assigned,
    /// nuclei or cells had no foreground labels
    Empty {
        /// the empty tier
        tier: Tier,
    },
}

/// Matching statistics of one tier pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairSummary {
    /// adjacency edges kept after thresholding
    pub edges: usize,
    /// connected components matched independently
    pub partitions: usize,
    /// matched pairs
    pub matched: usize,
}

/// Counts reported for one field of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    /// foreground objects per tier
    pub objects: BTreeMap<Tier, usize>,
    /// nucleus to cell matching
    pub nucleus_cell: PairSummary,
    /// spot to nucleus matching
    pub spot_nucleus: PairSummary,
    /// objects surviving per tier
    pub kept: BTreeMap<Tier, usize>,
    /// dropped objects per tier and reason
    pub excluded: BTreeMap<String, usize>,
}

/// Everything [assign_field] produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAssignment {
    /// whether matching ran
    pub outcome: FieldOutcome,
    /// per-tier lookup tables
    pub luts: TierLuts,
    /// relabeled images
    #[serde(skip)]
    pub relabeled: RelabeledField,
    /// `(spot, nucleus, cell)` in original labels, sorted by spot
    pub associations: Vec<AssociationRow>,
    /// objects no matching gave an owner (cells: no nucleus)
    pub unassigned: Vec<Vertex>,
    /// objects dropped after matching
    pub excluded: Vec<ExcludedObject>,
    /// shape of every input object
    pub regions: TierRegions,
    /// counts
    pub summary: FieldSummary,
}

impl FieldAssignment {
    fn empty(tier: Tier, shape: (usize, usize)) -> Self {
        FieldAssignment {
            outcome: FieldOutcome::Empty { tier },
            luts: TierLuts::default(),
            relabeled: RelabeledField::empty(shape),
            associations: Vec::new(),
            unassigned: Vec::new(),
            excluded: Vec::new(),
            regions: TierRegions::default(),
            summary: FieldSummary::default(),
        }
    }

    /// True when matching did not run.
    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, FieldOutcome::Empty { .. })
    }
}

fn match_pair(
    adjacency: &Adjacency,
    rules: &MatchingRules,
) -> Result<(Matching, PairSummary), AssignError> {
    let graph = adjacency.to_graph()?;
    graph.check_undirected()?;
    let partitions = graph.find_partitions();
    let matching = match_partitions(&partitions, rules);
    debug!(
        "{}: {} vertices in {} partitions, {} matched",
        rules.tiers,
        graph.vertex_count(),
        partitions.len(),
        matching.len()
    );
    let summary = PairSummary {
        edges: graph.edge_count(),
        partitions: partitions.len(),
        matched: matching.len(),
    };
    Ok((matching, summary))
}

/// Assign spots to nuclei and nuclei to cells, then relabel all three tiers.
///
/// Spot-nucleus and nucleus-cell are matched independently and composed
/// afterwards. A field without nuclei or cells yields an empty assignment
/// rather than an error. A field without spots still assigns nuclei to cells.
pub fn assign_field(
    labels: &FieldLabels<'_>,
    config: &AssignConfig,
) -> Result<FieldAssignment, AssignError> {
    config.validate()?;
    let shape = labels.shape()?;

    let nucleus_cell_adj = match build_adjacency(
        labels.nuclei,
        labels.cells,
        TierPair::NUCLEUS_CELL,
        &config.nucleus_cell,
    ) {
        Ok(adj) => adj,
        Err(AssignError::EmptyInput { tier }) => {
            warn!("no {tier} labels, nothing to assign");
            return Ok(FieldAssignment::empty(tier, shape));
        }
        Err(e) => return Err(e),
    };
    let (nucleus_cell, nucleus_cell_summary) = match_pair(
        &nucleus_cell_adj,
        &MatchingRules {
            tiers: TierPair::NUCLEUS_CELL,
            owner_capacity: NonZeroUsize::new(1),
            tie_break: config.tie_break,
        },
    )?;

    let (spot_nucleus, spot_nucleus_summary) = match build_adjacency(
        labels.spots,
        labels.nuclei,
        TierPair::SPOT_NUCLEUS,
        &config.spot_nucleus,
    ) {
        Ok(adj) => match_pair(
            &adj,
            &MatchingRules {
                tiers: TierPair::SPOT_NUCLEUS,
                owner_capacity: config.spots_per_nucleus,
                tie_break: config.tie_break,
            },
        )?,
        Err(AssignError::EmptyInput { tier: Tier::Spot }) => {
            warn!("no spot labels, assigning nuclei to cells only");
            (Matching::default(), PairSummary::default())
        }
        Err(e) => return Err(e),
    };

    let regions = TierRegions::measure(labels);
    let remapped = remap(labels, &regions, &spot_nucleus, &nucleus_cell, config);

    let mut unassigned: Vec<Vertex> = nucleus_cell
        .unmatched
        .iter()
        .chain(spot_nucleus.unmatched.iter().filter(|v| v.tier == Tier::Spot))
        .copied()
        .collect();
    unassigned.sort_unstable();

    let summary = FieldSummary {
        objects: Tier::ALL
            .into_iter()
            .map(|t| (t, regions.tier(t).len()))
            .collect(),
        nucleus_cell: nucleus_cell_summary,
        spot_nucleus: spot_nucleus_summary,
        kept: BTreeMap::from([
            (Tier::Spot, remapped.luts.spots.kept().count()),
            (Tier::Nucleus, remapped.luts.nuclei.kept().count()),
            (Tier::Cell, remapped.luts.cells.kept().count()),
        ]),
        excluded: exclusion_counts(&remapped.excluded)
            .into_iter()
            .map(|((tier, reason), n)| (format!("{tier}:{}", reason_name(reason)), n))
            .collect(),
    };
    info!(
        "kept {} of {} cells, {} of {} spots",
        summary.kept[&Tier::Cell],
        summary.objects[&Tier::Cell],
        summary.kept[&Tier::Spot],
        summary.objects[&Tier::Spot],
    );
    for (key, n) in &summary.excluded {
        info!("{n} discarded ({key})");
    }

    Ok(FieldAssignment {
        outcome: FieldOutcome::Assigned,
        luts: remapped.luts,
        relabeled: remapped.relabeled,
        associations: remapped.associations,
        unassigned,
        excluded: remapped.excluded,
        regions,
        summary,
    })
}

fn reason_name(reason: Exclusion) -> &'static str {
    match reason {
        Exclusion::Unmatched => "unmatched",
        Exclusion::Border => "border",
        Exclusion::TooSmall => "too_small",
        Exclusion::TooLarge => "too_large",
        Exclusion::LowSolidity => "low_solidity",
        Exclusion::LowExtent => "low_extent",
        Exclusion::NucleusCoverage => "nucleus_coverage",
        Exclusion::PartnerExcluded => "partner_excluded",
    }
}
