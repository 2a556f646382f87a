//! Index backend seam.
//!
//! A backend supplies two kinds of objects: a metric space (distance function
//! for one space type) and an index built against that space. The index never
//! stores its space; every call that needs distances receives the space by
//! reference, so the owner decides lifetimes and always releases the index
//! before the space.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::encoding::EncodedVector;
use crate::error::KnnError;
use crate::manifest::IndexManifest;
use crate::params::AnyParams;
use crate::queue::TopKQueue;
use crate::space::SpaceType;

pub mod distance;
pub mod exact;
pub mod hnsw;
pub mod usearch_index;

pub use exact::ExactBackend;
pub use hnsw::HnswBackend;
pub use usearch_index::UsearchBackend;

/// Distance function for one space type.
pub trait MetricSpace: Send + Sync {
    fn space_type(&self) -> SpaceType;

    /// Backend name of the space.
    fn desc(&self) -> &'static str {
        self.space_type().backend_name()
    }

    fn distance(&self, a: &EncodedVector, b: &EncodedVector) -> f32;
}

/// Transient query object over an encoded query vector.
#[derive(Debug, Clone, Copy)]
pub struct KnnQuery<'a> {
    pub vector: &'a EncodedVector,
    pub k: usize,
}

impl<'a> KnnQuery<'a> {
    pub fn new(vector: &'a EncodedVector, k: usize) -> Self {
        Self { vector, k }
    }
}

/// Index object created by a backend.
///
/// Implementations must be safe for concurrent `search` calls.
pub trait NativeIndex: Send + Sync {
    /// Run index construction over `dataset`.
    fn create_index(
        &mut self,
        space: &dyn MetricSpace,
        dataset: &Dataset,
        params: &AnyParams,
    ) -> Result<(), KnnError>;

    /// Persist to `path`.
    fn save_index(&self, path: &Path) -> Result<(), KnnError>;

    /// Restore persisted state from `path`.
    fn load_index(
        &mut self,
        space: &dyn MetricSpace,
        path: &Path,
        manifest: &IndexManifest,
    ) -> Result<(), KnnError>;

    /// Apply query-time defaults such as `efSearch`.
    fn set_query_time_params(&mut self, params: &AnyParams) -> Result<(), KnnError>;

    /// Return up to `query.k` neighbors in a bounded top-k queue.
    fn search(&self, space: &dyn MetricSpace, query: &KnnQuery<'_>)
        -> Result<TopKQueue, KnnError>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Factory for spaces and indexes.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_space(&self, space_type: SpaceType) -> Result<Box<dyn MetricSpace>, KnnError>;

    fn create_index(&self, space: &dyn MetricSpace) -> Result<Box<dyn NativeIndex>, KnnError>;
}

/// Metric space backed by the distance functions in [`distance`].
#[derive(Debug, Clone, Copy)]
pub struct StandardSpace {
    space_type: SpaceType,
}

impl StandardSpace {
    pub fn new(space_type: SpaceType) -> Self {
        Self { space_type }
    }
}

impl MetricSpace for StandardSpace {
    fn space_type(&self) -> SpaceType {
        self.space_type
    }

    fn distance(&self, a: &EncodedVector, b: &EncodedVector) -> f32 {
        distance::distance(self.space_type, a, b)
    }
}

/// Built-in backends, selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Graph index over every space type
    #[default]
    Hnsw,
    /// Brute-force scan
    Exact,
    /// usearch HNSW for dense l2/cosinesimil/innerproduct
    Usearch,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Hnsw => hnsw::BACKEND_NAME,
            BackendKind::Exact => exact::BACKEND_NAME,
            BackendKind::Usearch => usearch_index::BACKEND_NAME,
        }
    }

    pub fn create(&self) -> Arc<dyn Backend> {
        match self {
            BackendKind::Hnsw => Arc::new(HnswBackend),
            BackendKind::Exact => Arc::new(ExactBackend),
            BackendKind::Usearch => Arc::new(UsearchBackend),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = KnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hnsw" => Ok(BackendKind::Hnsw),
            "exact" => Ok(BackendKind::Exact),
            "usearch" => Ok(BackendKind::Usearch),
            other => Err(KnnError::InvalidArgument(format!(
                "unknown backend {:?} (expected hnsw, exact or usearch)",
                other
            ))),
        }
    }
}
