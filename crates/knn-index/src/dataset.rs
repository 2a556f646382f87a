//! Dataset builder.
//!
//! Validates a batch of `(id, raw vector)` pairs and encodes every vector for
//! the target space. All shape checks run before the first vector is
//! encoded, so a rejected batch never allocates an encoded entry. Entries are
//! owned by the returned [`Dataset`]; if encoding fails part way, the entries
//! built so far are dropped before the error reaches the caller.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::{check_bitset_dimension, encode, EncodedVector};
use crate::error::KnnError;
use crate::space::{EncodingStrategy, SpaceType};

/// Raw input vector with its document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: i64,
    #[serde(rename = "vector")]
    pub raw: Vec<f32>,
}

impl VectorRecord {
    pub fn new(id: i64, raw: Vec<f32>) -> Self {
        Self { id, raw }
    }
}

/// One encoded dataset entry handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub id: i64,
    pub vector: EncodedVector,
}

/// Encoded dataset for one build.
#[derive(Debug)]
pub struct Dataset {
    space_type: SpaceType,
    dimension: usize,
    entries: Vec<DataObject>,
}

impl Dataset {
    /// Validate and encode parallel `ids` / `vectors` slices.
    pub fn build(
        space_type: SpaceType,
        ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<Self, KnnError> {
        let dimension = validate_shape(space_type, ids, vectors)?;

        let mut entries = Vec::with_capacity(ids.len());
        for (&id, raw) in ids.iter().zip(vectors) {
            // `entries` drops with the error on early return.
            let vector = encode(space_type, raw)?;
            entries.push(DataObject { id, vector });
        }

        debug!(
            space = %space_type,
            dimension = dimension,
            entries = entries.len(),
            "Encoded dataset"
        );
        Ok(Self {
            space_type,
            dimension,
            entries,
        })
    }

    /// Build from records instead of parallel slices.
    pub fn from_records(space_type: SpaceType, records: &[VectorRecord]) -> Result<Self, KnnError> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.raw.clone()).collect();
        Self::build(space_type, &ids, &vectors)
    }

    pub fn space_type(&self) -> SpaceType {
        self.space_type
    }

    /// Raw dimension shared by every input vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[DataObject] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check every precondition of a build and return the shared dimension.
fn validate_shape(
    space_type: SpaceType,
    ids: &[i64],
    vectors: &[Vec<f32>],
) -> Result<usize, KnnError> {
    if ids.len() != vectors.len() {
        return Err(KnnError::DimensionMismatch {
            context: "number of ids vs number of vectors",
            expected: ids.len(),
            actual: vectors.len(),
        });
    }

    let Some(first) = vectors.first() else {
        return Err(KnnError::InvalidArgument(
            "cannot build an index from an empty dataset".to_string(),
        ));
    };
    let dimension = first.len();

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(KnnError::DimensionMismatch {
            context: "vector length",
            expected: dimension,
            actual: bad.len(),
        });
    }

    if space_type.encoding() == EncodingStrategy::PackedBitset {
        check_bitset_dimension(dimension)?;
    }

    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(KnnError::InvalidArgument(format!(
            "duplicate id {} in build batch",
            dup
        )));
    }

    Ok(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_encodes_in_order() {
        let ids = [7, 3, 9];
        let vectors = vec![vec![1.0, 0.0, 1.0], vec![0.0, 0.0, 0.0], vec![0.0, 2.0, 0.0]];
        let dataset = Dataset::build(SpaceType::SparseSetMembership, &ids, &vectors).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.dimension(), 3);
        let ids_out: Vec<i64> = dataset.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids_out, vec![7, 3, 9]);
        assert_eq!(dataset.entries()[0].vector, EncodedVector::SparseSet(vec![0, 2]));
        assert_eq!(dataset.entries()[1].vector, EncodedVector::SparseSet(vec![]));
    }

    #[test]
    fn test_count_mismatch() {
        let err = Dataset::build(SpaceType::L2, &[1, 2], &[vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            KnnError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        let err = Dataset::build(SpaceType::L1, &[1, 2], &vectors).unwrap_err();
        assert!(matches!(
            err,
            KnnError::DimensionMismatch {
                context: "vector length",
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = Dataset::build(SpaceType::L2, &[], &[]).unwrap_err();
        assert!(matches!(err, KnnError::InvalidArgument(_)));
    }

    #[test]
    fn test_bitset_dimension_checked_up_front() {
        let err = Dataset::build(SpaceType::PackedBitset, &[1], &[vec![1.0]]).unwrap_err();
        assert!(matches!(err, KnnError::EncodingConstraint { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let vectors = vec![vec![1.0], vec![2.0]];
        let err = Dataset::build(SpaceType::L2, &[5, 5], &vectors).unwrap_err();
        assert!(matches!(err, KnnError::InvalidArgument(ref m) if m.contains("duplicate id 5")));
    }

    #[test]
    fn test_from_records() {
        let records = vec![
            VectorRecord::new(1, vec![1.0, 0.0]),
            VectorRecord::new(2, vec![0.0, 1.0]),
        ];
        let dataset = Dataset::from_records(SpaceType::PackedBitset, &records).unwrap();
        assert_eq!(dataset.space_type(), SpaceType::PackedBitset);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_record_json_shape() {
        let record: VectorRecord = serde_json::from_str(r#"{"id": 4, "vector": [0.5, 1.5]}"#).unwrap();
        assert_eq!(record, VectorRecord::new(4, vec![0.5, 1.5]));
    }
}
