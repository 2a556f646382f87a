//! Vector encoder.
//!
//! Maps one raw float vector to the layout its space type requires:
//! - dense spaces keep the floats as they are
//! - `jaccard_sparse` keeps the ascending indices of the nonzero entries
//! - `bit_jaccard` packs nonzero entries into 32-bit words, LSB-first, and
//!   appends one word holding the dimension
//!
//! Every encoding is a pure function producing a new, separately typed value.
//! The sparse and bitset layouts never need more bytes than the raw input.

use serde::{Deserialize, Serialize};

use crate::error::KnnError;
use crate::space::{EncodingStrategy, SpaceType};

/// Bits per packed word.
pub const WORD_BITS: usize = 32;

/// Smallest dimension the packed bitset layout accepts.
pub const MIN_BITSET_DIMENSION: usize = 2;

/// A vector in the layout required by its space type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EncodedVector {
    Dense(Vec<f32>),
    SparseSet(Vec<u32>),
    Bitset(PackedBits),
}

/// Packed boolean vector: `ceil(D/32)` data words followed by one word holding D.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedBits {
    words: Vec<u32>,
}

impl PackedBits {
    /// Pack a raw vector, treating every nonzero entry as a set bit.
    pub fn pack(raw: &[f32]) -> Self {
        let data_words = raw.len().div_ceil(WORD_BITS);
        let mut words = vec![0u32; data_words + 1];
        for (i, &value) in raw.iter().enumerate() {
            if value != 0.0 {
                words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
            }
        }
        words[data_words] = raw.len() as u32;
        Self { words }
    }

    /// Number of logical bits (the trailing word).
    pub fn dimension(&self) -> usize {
        self.words.last().copied().unwrap_or(0) as usize
    }

    /// Packed data words, without the trailing dimension word.
    pub fn data_words(&self) -> &[u32] {
        &self.words[..self.words.len().saturating_sub(1)]
    }

    /// All words, including the trailing dimension word.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Data word `index` with any bits at or beyond the dimension cleared.
    pub fn masked_word(&self, index: usize) -> u32 {
        let word = self.data_words().get(index).copied().unwrap_or(0);
        let dim = self.dimension();
        let start = index * WORD_BITS;
        if start >= dim {
            return 0;
        }
        let live = dim - start;
        if live >= WORD_BITS {
            word
        } else {
            word & ((1u32 << live) - 1)
        }
    }

    pub fn bit(&self, index: usize) -> bool {
        index < self.dimension()
            && (self.masked_word(index / WORD_BITS) >> (index % WORD_BITS)) & 1 == 1
    }

    /// Number of set bits within the dimension.
    pub fn count_ones(&self) -> u32 {
        (0..self.data_words().len())
            .map(|i| self.masked_word(i).count_ones())
            .sum()
    }
}

impl EncodedVector {
    pub fn strategy(&self) -> EncodingStrategy {
        match self {
            EncodedVector::Dense(_) => EncodingStrategy::Dense,
            EncodedVector::SparseSet(_) => EncodingStrategy::SparseSet,
            EncodedVector::Bitset(_) => EncodingStrategy::PackedBitset,
        }
    }

    /// Length in 32-bit units.
    pub fn len_units(&self) -> usize {
        match self {
            EncodedVector::Dense(values) => values.len(),
            EncodedVector::SparseSet(indices) => indices.len(),
            EncodedVector::Bitset(bits) => bits.words().len(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.len_units() * 4
    }

    /// Canonical little-endian byte layout.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            EncodedVector::Dense(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            EncodedVector::SparseSet(indices) => {
                for i in indices {
                    out.extend_from_slice(&i.to_le_bytes());
                }
            }
            EncodedVector::Bitset(bits) => {
                for w in bits.words() {
                    out.extend_from_slice(&w.to_le_bytes());
                }
            }
        }
        out
    }

    pub fn as_dense(&self) -> Option<&[f32]> {
        match self {
            EncodedVector::Dense(values) => Some(values),
            _ => None,
        }
    }
}

/// Encode `raw` for `space`.
pub fn encode(space: SpaceType, raw: &[f32]) -> Result<EncodedVector, KnnError> {
    match space.encoding() {
        EncodingStrategy::Dense => Ok(EncodedVector::Dense(raw.to_vec())),
        EncodingStrategy::SparseSet => Ok(EncodedVector::SparseSet(encode_sparse_set(raw))),
        EncodingStrategy::PackedBitset => {
            check_bitset_dimension(raw.len())?;
            Ok(EncodedVector::Bitset(PackedBits::pack(raw)))
        }
    }
}

/// Ascending indices of the nonzero entries of `raw`.
pub fn encode_sparse_set(raw: &[f32]) -> Vec<u32> {
    raw.iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(i, _)| i as u32)
        .collect()
}

pub(crate) fn check_bitset_dimension(dimension: usize) -> Result<(), KnnError> {
    if dimension < MIN_BITSET_DIMENSION {
        return Err(KnnError::EncodingConstraint {
            space: SpaceType::PackedBitset,
            reason: format!(
                "dimension must be at least {}, got {}",
                MIN_BITSET_DIMENSION, dimension
            ),
        });
    }
    Ok(())
}
