//! Space type registry.
//!
//! A space type selects both the distance function and the encoding that
//! vectors must go through before they reach the backend. Host-facing names
//! (`l2`, `innerproduct`, ...) and backend names (`l2`, `negdotprod`, ...)
//! differ only for inner product, which is searched as a negated dot product
//! so that a smaller distance always means closer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KnnError;

/// Supported metric spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceType {
    #[serde(rename = "l1")]
    L1,
    #[default]
    #[serde(rename = "l2")]
    L2,
    #[serde(rename = "linf")]
    LInf,
    #[serde(rename = "cosinesimil")]
    CosineSimilarity,
    #[serde(rename = "innerproduct")]
    InnerProduct,
    #[serde(rename = "jaccard_sparse")]
    SparseSetMembership,
    #[serde(rename = "bit_jaccard")]
    PackedBitset,
}

/// How raw float vectors are laid out for a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingStrategy {
    /// Raw floats, unchanged
    Dense,
    /// Ascending indices of the nonzero entries
    SparseSet,
    /// One bit per dimension, LSB-first, plus a trailing dimension word
    PackedBitset,
}

impl SpaceType {
    pub const ALL: [SpaceType; 7] = [
        SpaceType::L1,
        SpaceType::L2,
        SpaceType::LInf,
        SpaceType::CosineSimilarity,
        SpaceType::InnerProduct,
        SpaceType::SparseSetMembership,
        SpaceType::PackedBitset,
    ];

    /// Resolve a host-facing space name. Matching ignores ASCII case and
    /// surrounding whitespace.
    pub fn from_name(name: &str) -> Result<Self, KnnError> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|space| space.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| KnnError::UnsupportedSpaceType(name.to_string()))
    }

    /// Host-facing name.
    pub fn name(&self) -> &'static str {
        match self {
            SpaceType::L1 => "l1",
            SpaceType::L2 => "l2",
            SpaceType::LInf => "linf",
            SpaceType::CosineSimilarity => "cosinesimil",
            SpaceType::InnerProduct => "innerproduct",
            SpaceType::SparseSetMembership => "jaccard_sparse",
            SpaceType::PackedBitset => "bit_jaccard",
        }
    }

    /// Name the backend knows the space by.
    pub fn backend_name(&self) -> &'static str {
        match self {
            SpaceType::InnerProduct => "negdotprod",
            other => other.name(),
        }
    }

    pub fn encoding(&self) -> EncodingStrategy {
        match self {
            SpaceType::SparseSetMembership => EncodingStrategy::SparseSet,
            SpaceType::PackedBitset => EncodingStrategy::PackedBitset,
            _ => EncodingStrategy::Dense,
        }
    }

    /// Whether queries must have exactly the dimension the index was built with.
    pub fn requires_fixed_dimension(&self) -> bool {
        self.encoding() != EncodingStrategy::SparseSet
    }

    /// Convert a raw backend distance into a score where higher is better.
    ///
    /// Inner product distances are negated dot products and can be negative;
    /// those map onto `[1, inf)` so that ordering is preserved across zero.
    pub fn score_translation(&self, raw: f32) -> f32 {
        match self {
            SpaceType::L1 | SpaceType::L2 | SpaceType::LInf | SpaceType::CosineSimilarity => {
                1.0 / (1.0 + raw)
            }
            SpaceType::InnerProduct => {
                if raw >= 0.0 {
                    1.0 / (1.0 + raw)
                } else {
                    -raw + 1.0
                }
            }
            SpaceType::SparseSetMembership | SpaceType::PackedBitset => 1.0 - raw,
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpaceType {
    type Err = KnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
