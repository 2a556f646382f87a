//! usearch backend for dense spaces.
//!
//! usearch reports squared L2 and `1 - dot` for inner product; both are
//! converted so that results match the other backends (`l2` is Euclidean,
//! `innerproduct` is the negated dot product).
//!
//! usearch keys are dataset positions, not ids: `u64::MAX` is reserved by
//! usearch, so no cast of an `i64` id is safe. The position-to-id table is
//! persisted beside the index as `<path>.ids.json`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{Backend, KnnQuery, MetricSpace, NativeIndex, StandardSpace};
use crate::dataset::Dataset;
use crate::error::KnnError;
use crate::manifest::IndexManifest;
use crate::params::{AnyParams, EF_CONSTRUCTION, EF_SEARCH, INDEX_THREAD_QTY, M};
use crate::queue::TopKQueue;
use crate::space::SpaceType;

pub const BACKEND_NAME: &str = "usearch";

/// Suffix of the key-to-id table written beside the usearch file.
pub const IDS_SUFFIX: &str = ".ids.json";

const DEFAULT_CONNECTIVITY: usize = 16;
const DEFAULT_EXPANSION_ADD: usize = 200;
const DEFAULT_EXPANSION_SEARCH: usize = 100;

/// Factory for [`UsearchIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UsearchBackend;

impl Backend for UsearchBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn create_space(&self, space_type: SpaceType) -> Result<Box<dyn MetricSpace>, KnnError> {
        metric_kind(space_type)?;
        Ok(Box::new(StandardSpace::new(space_type)))
    }

    fn create_index(&self, space: &dyn MetricSpace) -> Result<Box<dyn NativeIndex>, KnnError> {
        metric_kind(space.space_type())?;
        Ok(Box::new(UsearchIndex {
            space_type: space.space_type(),
            index: None,
            ids: Vec::new(),
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }))
    }
}

fn metric_kind(space_type: SpaceType) -> Result<MetricKind, KnnError> {
    match space_type {
        SpaceType::L2 => Ok(MetricKind::L2sq),
        SpaceType::CosineSimilarity => Ok(MetricKind::Cos),
        SpaceType::InnerProduct => Ok(MetricKind::IP),
        // usearch only handles dense float metrics
        other => Err(KnnError::UnsupportedSpaceType(other.name().to_string())),
    }
}

fn usearch_err(context: &str, e: impl std::fmt::Display) -> KnnError {
    KnnError::Backend(format!("usearch {}: {}", context, e))
}

fn ids_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_owned();
    name.push(IDS_SUFFIX);
    PathBuf::from(name)
}

fn path_str(path: &Path) -> Result<&str, KnnError> {
    path.to_str()
        .ok_or_else(|| KnnError::InvalidArgument("Invalid path encoding".to_string()))
}

/// Wrapper around a usearch index.
pub struct UsearchIndex {
    space_type: SpaceType,
    index: Option<Index>,
    /// Id of the vector stored under each usearch key
    ids: Vec<i64>,
    expansion_search: usize,
}

impl UsearchIndex {
    fn options(
        &self,
        dimension: usize,
        connectivity: usize,
        expansion_add: usize,
    ) -> Result<IndexOptions, KnnError> {
        Ok(IndexOptions {
            dimensions: dimension,
            metric: metric_kind(self.space_type)?,
            quantization: ScalarKind::F32,
            connectivity,
            expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per key
        })
    }

    fn to_distance(&self, raw: f32) -> f32 {
        match self.space_type {
            SpaceType::L2 => raw.max(0.0).sqrt(),
            SpaceType::InnerProduct => raw - 1.0,
            _ => raw,
        }
    }

    fn built(&self) -> Result<&Index, KnnError> {
        self.index
            .as_ref()
            .ok_or_else(|| KnnError::Backend("usearch index not built or loaded".to_string()))
    }
}

impl NativeIndex for UsearchIndex {
    fn create_index(
        &mut self,
        _space: &dyn MetricSpace,
        dataset: &Dataset,
        params: &AnyParams,
    ) -> Result<(), KnnError> {
        params.check_known(&[EF_CONSTRUCTION, M, INDEX_THREAD_QTY])?;
        let connectivity = params.get_usize(M)?.unwrap_or(DEFAULT_CONNECTIVITY);
        let expansion_add = params
            .get_usize(EF_CONSTRUCTION)?
            .unwrap_or(DEFAULT_EXPANSION_ADD);
        if let Some(threads) = params.get_usize(INDEX_THREAD_QTY)? {
            debug!(threads = threads, "indexThreadQty accepted, vectors are added sequentially");
        }

        let options = self.options(dataset.dimension(), connectivity, expansion_add)?;
        let index = Index::new(&options).map_err(|e| usearch_err("create", e))?;
        index
            .reserve(dataset.len())
            .map_err(|e| usearch_err("reserve", e))?;

        let mut ids = Vec::with_capacity(dataset.len());
        for (key, object) in dataset.entries().iter().enumerate() {
            let vector = object.vector.as_dense().ok_or_else(|| {
                KnnError::Backend("usearch backend requires dense vectors".to_string())
            })?;
            index
                .add(key as u64, vector)
                .map_err(|e| usearch_err("add", e))?;
            ids.push(object.id);
        }
        if index.size() != ids.len() {
            return Err(KnnError::Backend(format!(
                "usearch holds {} vectors after adding {}",
                index.size(),
                ids.len()
            )));
        }

        info!(
            vectors = index.size(),
            dim = dataset.dimension(),
            connectivity = connectivity,
            "Built usearch index"
        );
        self.index = Some(index);
        self.ids = ids;
        Ok(())
    }

    fn save_index(&self, path: &Path) -> Result<(), KnnError> {
        self.built()?
            .save(path_str(path)?)
            .map_err(|e| usearch_err("save", e))?;
        let writer = BufWriter::new(File::create(ids_path(path))?);
        serde_json::to_writer(writer, &self.ids)?;
        Ok(())
    }

    fn load_index(
        &mut self,
        _space: &dyn MetricSpace,
        path: &Path,
        manifest: &IndexManifest,
    ) -> Result<(), KnnError> {
        let options = self.options(
            manifest.dimension,
            manifest.build_params.m.unwrap_or(DEFAULT_CONNECTIVITY),
            manifest
                .build_params
                .ef_construction
                .unwrap_or(DEFAULT_EXPANSION_ADD),
        )?;
        let index = Index::new(&options).map_err(|e| usearch_err("create", e))?;
        index
            .load(path_str(path)?)
            .map_err(|e| usearch_err("load", e))?;

        let reader = BufReader::new(File::open(ids_path(path))?);
        let ids: Vec<i64> = serde_json::from_reader(reader)?;
        if ids.len() != index.size() {
            return Err(KnnError::Backend(format!(
                "id table lists {} vectors, usearch file holds {}",
                ids.len(),
                index.size()
            )));
        }
        self.index = Some(index);
        self.ids = ids;
        Ok(())
    }

    fn set_query_time_params(&mut self, params: &AnyParams) -> Result<(), KnnError> {
        params.check_known(&[EF_SEARCH])?;
        if let Some(ef) = params.get_usize(EF_SEARCH)? {
            // usearch sizes its search buffers from this value.
            let ef = match &self.index {
                Some(index) => ef.min(index.size().max(1)),
                None => ef,
            };
            self.expansion_search = ef;
            if let Some(index) = &self.index {
                index.change_expansion_search(ef);
            }
        }
        Ok(())
    }

    fn search(
        &self,
        _space: &dyn MetricSpace,
        query: &KnnQuery<'_>,
    ) -> Result<TopKQueue, KnnError> {
        let index = self.built()?;
        let vector = query.vector.as_dense().ok_or_else(|| {
            KnnError::Backend("usearch backend requires a dense query".to_string())
        })?;

        let mut queue = TopKQueue::new(query.k);
        let k = query.k.min(index.size());
        if k == 0 {
            return Ok(queue);
        }
        let matches = index
            .search(vector, k)
            .map_err(|e| usearch_err("search", e))?;
        for (&key, &raw) in matches.keys.iter().zip(matches.distances.iter()) {
            let id = self.ids.get(key as usize).copied().ok_or_else(|| {
                KnnError::Backend(format!("usearch returned unknown key {}", key))
            })?;
            queue.push(id, self.to_distance(raw));
        }
        Ok(queue)
    }

    fn len(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.size())
    }
}
