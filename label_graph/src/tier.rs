use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifier of one segmented object in a label image. Zero is background.
pub type Label = u32;

/// Kind of segmented object a label belongs to.
///
/// The declaration order (spot < nucleus < cell) is the containment order and
/// is used when sorting vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// fluorescent spot
    Spot,
    /// nucleus
    Nucleus,
    /// whole cell
    Cell,
}

impl Tier {
    /// All tiers, innermost first.
    pub const ALL: [Tier; 3] = [Tier::Spot, Tier::Nucleus, Tier::Cell];

    /// Lowercase name used in logs and file names.
    pub fn name(self) -> &'static str {
        match self {
            Tier::Spot => "spot",
            Tier::Nucleus => "nucleus",
            Tier::Cell => "cell",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A label tagged with its tier. Labels are only unique within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vertex {
    /// tier of the object
    pub tier: Tier,
    /// label of the object within its tier
    pub label: Label,
}

impl Vertex {
    /// Tag `label` with `tier`.
    pub fn new(tier: Tier, label: Label) -> Self {
        Vertex { tier, label }
    }
    /// Spot vertex
    pub fn spot(label: Label) -> Self {
        Vertex::new(Tier::Spot, label)
    }
    /// Nucleus vertex
    pub fn nucleus(label: Label) -> Self {
        Vertex::new(Tier::Nucleus, label)
    }
    /// Cell vertex
    pub fn cell(label: Label) -> Self {
        Vertex::new(Tier::Cell, label)
    }
}

impl Display for Vertex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tier, self.label)
    }
}

/// Ordered pair of tiers: objects of the `owned` tier are assigned to objects
/// of the `owner` tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TierPair {
    owned: Tier,
    owner: Tier,
}

impl TierPair {
    /// Spots are owned by nuclei.
    pub const SPOT_NUCLEUS: TierPair = TierPair {
        owned: Tier::Spot,
        owner: Tier::Nucleus,
    };
    /// Nuclei are owned by cells.
    pub const NUCLEUS_CELL: TierPair = TierPair {
        owned: Tier::Nucleus,
        owner: Tier::Cell,
    };

    /// Fails when both tiers are equal.
    pub fn new(owned: Tier, owner: Tier) -> Result<Self, GraphError> {
        if owned == owner {
            return Err(GraphError::InvalidEdgeKind {
                a: Vertex::new(owned, 0),
                b: Vertex::new(owner, 0),
            });
        }
        Ok(TierPair { owned, owner })
    }
    /// Tier of the assigned objects.
    pub fn owned(self) -> Tier {
        self.owned
    }
    /// Tier of the owning objects.
    pub fn owner(self) -> Tier {
        self.owner
    }
}

impl Display for TierPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.owned, self.owner)
    }
}
