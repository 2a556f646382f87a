//! Brute-force backend.
//!
//! Scans every stored vector on each query. Results are exact, which makes
//! this backend the reference the graph backends are tested against.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Backend, KnnQuery, MetricSpace, NativeIndex, StandardSpace};
use crate::dataset::{DataObject, Dataset};
use crate::error::KnnError;
use crate::manifest::IndexManifest;
use crate::params::{AnyParams, EF_CONSTRUCTION, EF_SEARCH, INDEX_THREAD_QTY, M};
use crate::queue::TopKQueue;
use crate::space::SpaceType;

pub const BACKEND_NAME: &str = "exact";

/// Factory for [`ExactIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactBackend;

impl Backend for ExactBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn create_space(&self, space_type: SpaceType) -> Result<Box<dyn MetricSpace>, KnnError> {
        Ok(Box::new(StandardSpace::new(space_type)))
    }

    fn create_index(&self, space: &dyn MetricSpace) -> Result<Box<dyn NativeIndex>, KnnError> {
        Ok(Box::new(ExactIndex::new(space.desc())))
    }
}

#[derive(Serialize, Deserialize)]
struct ExactSnapshot {
    space: String,
    objects: Vec<DataObject>,
}

/// Flat list of encoded vectors.
pub struct ExactIndex {
    space: &'static str,
    objects: Vec<DataObject>,
}

impl ExactIndex {
    fn new(space: &'static str) -> Self {
        Self {
            space,
            objects: Vec::new(),
        }
    }
}

impl NativeIndex for ExactIndex {
    fn create_index(
        &mut self,
        _space: &dyn MetricSpace,
        dataset: &Dataset,
        params: &AnyParams,
    ) -> Result<(), KnnError> {
        params.check_known(&[EF_CONSTRUCTION, M, INDEX_THREAD_QTY])?;
        self.objects = dataset.entries().to_vec();
        debug!(vectors = self.objects.len(), "Built exact index");
        Ok(())
    }

    fn save_index(&self, path: &Path) -> Result<(), KnnError> {
        let writer = BufWriter::new(File::create(path)?);
        let snapshot = ExactSnapshot {
            space: self.space.to_string(),
            objects: self.objects.clone(),
        };
        serde_json::to_writer(writer, &snapshot)?;
        Ok(())
    }

    fn load_index(
        &mut self,
        space: &dyn MetricSpace,
        path: &Path,
        _manifest: &IndexManifest,
    ) -> Result<(), KnnError> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: ExactSnapshot = serde_json::from_reader(reader)?;
        if snapshot.space != space.desc() {
            return Err(KnnError::Backend(format!(
                "index file holds space {:?}, expected {:?}",
                snapshot.space,
                space.desc()
            )));
        }
        self.objects = snapshot.objects;
        Ok(())
    }

    fn set_query_time_params(&mut self, params: &AnyParams) -> Result<(), KnnError> {
        params.check_known(&[EF_SEARCH])
    }

    fn search(
        &self,
        space: &dyn MetricSpace,
        query: &KnnQuery<'_>,
    ) -> Result<TopKQueue, KnnError> {
        let mut queue = TopKQueue::new(query.k);
        for object in &self.objects {
            queue.push(object.id, space.distance(query.vector, &object.vector));
        }
        Ok(queue)
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode;
    use tempfile::TempDir;

    fn build(
        space_type: SpaceType,
        ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> (Box<dyn MetricSpace>, Box<dyn NativeIndex>) {
        let backend = ExactBackend;
        let space = backend.create_space(space_type).unwrap();
        let mut index = backend.create_index(space.as_ref()).unwrap();
        let dataset = Dataset::build(space_type, ids, vectors).unwrap();
        index
            .create_index(space.as_ref(), &dataset, &AnyParams::default())
            .unwrap();
        (space, index)
    }

    #[test]
    fn test_exact_search_order() {
        let (space, index) = build(
            SpaceType::L1,
            &[1, 2, 3],
            &[vec![0.0, 0.0], vec![5.0, 5.0], vec![1.0, 1.0]],
        );
        let q = encode(SpaceType::L1, &[0.0, 0.0]).unwrap();
        let results = index
            .search(space.as_ref(), &KnnQuery::new(&q, 3))
            .unwrap()
            .into_sorted_vec();
        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(results[1].distance, 2.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("exact.idx");
        let (space, index) = build(SpaceType::L2, &[4, 5], &[vec![1.0], vec![2.0]]);
        index.save_index(&path).unwrap();

        let manifest = IndexManifest::new(SpaceType::L2, 1, 2, BACKEND_NAME, Default::default());
        let mut loaded = ExactBackend.create_index(space.as_ref()).unwrap();
        loaded.load_index(space.as_ref(), &path, &manifest).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_rejects_other_space() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("exact.idx");
        let (_, index) = build(SpaceType::L2, &[1], &[vec![1.0]]);
        index.save_index(&path).unwrap();

        let other = ExactBackend.create_space(SpaceType::L1).unwrap();
        let manifest = IndexManifest::new(SpaceType::L1, 1, 1, BACKEND_NAME, Default::default());
        let mut loaded = ExactBackend.create_index(other.as_ref()).unwrap();
        let err = loaded
            .load_index(other.as_ref(), &path, &manifest)
            .unwrap_err();
        assert!(matches!(err, KnnError::Backend(_)));
    }

    #[test]
    fn test_unknown_query_param_rejected() {
        let (_, mut index) = build(SpaceType::L2, &[1], &[vec![1.0]]);
        let params = AnyParams::parse(&["efSearch=10"]).unwrap();
        assert!(index.set_query_time_params(&params).is_ok());
        let params = AnyParams::parse(&["nlist=10"]).unwrap();
        assert!(index.set_query_time_params(&params).is_err());
    }
}
