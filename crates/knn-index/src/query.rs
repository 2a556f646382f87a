//! k-NN query execution over a loaded [`IndexHandle`].

use tracing::debug;

use crate::backend::KnnQuery;
use crate::encoding::encode;
use crate::error::KnnError;
use crate::lifecycle::IndexHandle;
use crate::queue::NeighborResult;

impl IndexHandle {
    /// Find the `k` nearest neighbors of `raw`, nearest first.
    ///
    /// Returns fewer than `k` results when the index holds fewer vectors.
    /// Equal distances are ordered by ascending id.
    pub fn query(&self, raw: &[f32], k: usize) -> Result<Vec<NeighborResult>, KnnError> {
        if k == 0 {
            return Err(KnnError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let space_type = self.space_type();
        if space_type.requires_fixed_dimension() && raw.len() != self.dimension() {
            return Err(KnnError::DimensionMismatch {
                context: "query vector",
                expected: self.dimension(),
                actual: raw.len(),
            });
        }

        let encoded = encode(space_type, raw)?;
        let query = KnnQuery::new(&encoded, k);
        let queue = self.index.search(self.space.as_ref(), &query)?;
        let results = queue.into_sorted_vec();

        debug!(
            space = %space_type,
            k = k,
            returned = results.len(),
            "Query complete"
        );
        Ok(results)
    }
}
