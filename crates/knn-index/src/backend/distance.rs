//! Distance functions over encoded vectors.
//!
//! Every function returns a value where smaller means closer.

use crate::encoding::{EncodedVector, PackedBits};
use crate::space::SpaceType;

/// Distance between two vectors encoded for `space`.
///
/// Vectors of the wrong encoding for the space are infinitely far apart.
pub fn distance(space: SpaceType, a: &EncodedVector, b: &EncodedVector) -> f32 {
    match (space, a, b) {
        (SpaceType::L1, EncodedVector::Dense(a), EncodedVector::Dense(b)) => l1(a, b),
        (SpaceType::L2, EncodedVector::Dense(a), EncodedVector::Dense(b)) => l2(a, b),
        (SpaceType::LInf, EncodedVector::Dense(a), EncodedVector::Dense(b)) => linf(a, b),
        (SpaceType::CosineSimilarity, EncodedVector::Dense(a), EncodedVector::Dense(b)) => {
            cosine(a, b)
        }
        (SpaceType::InnerProduct, EncodedVector::Dense(a), EncodedVector::Dense(b)) => {
            neg_dot(a, b)
        }
        (
            SpaceType::SparseSetMembership,
            EncodedVector::SparseSet(a),
            EncodedVector::SparseSet(b),
        ) => jaccard_sparse(a, b),
        (SpaceType::PackedBitset, EncodedVector::Bitset(a), EncodedVector::Bitset(b)) => {
            bit_jaccard(a, b)
        }
        _ => f32::INFINITY,
    }
}

pub fn l1(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn linf(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    1.0 - sim.clamp(-1.0, 1.0)
}

pub fn neg_dot(a: &[f32], b: &[f32]) -> f32 {
    -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
}

/// `1 - |A ∩ B| / |A ∪ B|` over ascending index lists.
pub fn jaccard_sparse(a: &[u32], b: &[u32]) -> f32 {
    let (mut i, mut j, mut common) = (0usize, 0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - common;
    if union == 0 {
        return 0.0;
    }
    1.0 - common as f32 / union as f32
}

/// `1 - popcount(a & b) / popcount(a | b)` over the first D bits.
pub fn bit_jaccard(a: &PackedBits, b: &PackedBits) -> f32 {
    let words = a.data_words().len().max(b.data_words().len());
    let (mut inter, mut union) = (0u32, 0u32);
    for w in 0..words {
        let (x, y) = (a.masked_word(w), b.masked_word(w));
        inter += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    if union == 0 {
        return 0.0;
    }
    1.0 - inter as f32 / union as f32
}
