//! Index lifecycle: build, load, free.
//!
//! Backend objects are held in `Box`es owned by local bindings or by an
//! [`IndexHandle`]. The space is always created before the index, so Rust's
//! reverse-declaration drop order releases the index first on every path,
//! including early returns through `?`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{Backend, BackendKind, MetricSpace, NativeIndex};
use crate::dataset::Dataset;
use crate::error::KnnError;
use crate::manifest::IndexManifest;
use crate::params::{BuildParameters, QueryParameters};
use crate::space::SpaceType;

/// Entry point for building and loading indexes with one backend.
#[derive(Clone)]
pub struct KnnEngine {
    backend: Arc<dyn Backend>,
}

impl KnnEngine {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Engine over one of the built-in backends.
    pub fn with_kind(kind: BackendKind) -> Self {
        Self::new(kind.create())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Build an index over `ids` / `vectors` and persist it to `output`.
    ///
    /// Writes the backend artifact at `output` and the manifest beside it.
    /// Input shape is validated before the backend allocates anything.
    pub fn build(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        space_type: SpaceType,
        params: &BuildParameters,
        output: &Path,
    ) -> Result<IndexManifest, KnnError> {
        params.validate()?;
        let dataset = Dataset::build(space_type, ids, vectors)?;

        let space = self.backend.create_space(space_type)?;
        let mut index = self.backend.create_index(space.as_ref())?;

        let backend_params = params.to_backend_params();
        debug!(params = %backend_params, backend = self.backend.name(), "Constructing index");
        index.create_index(space.as_ref(), &dataset, &backend_params)?;
        if index.len() != dataset.len() {
            return Err(KnnError::Backend(format!(
                "{} index holds {} of {} vectors",
                self.backend.name(),
                index.len(),
                dataset.len()
            )));
        }
        index.save_index(output)?;

        let manifest = IndexManifest::new(
            space_type,
            dataset.dimension(),
            dataset.len(),
            self.backend.name(),
            params.clone(),
        );
        manifest.write(output)?;

        info!(
            path = ?output,
            space = %space_type,
            vectors = dataset.len(),
            dim = dataset.dimension(),
            "Saved index"
        );
        Ok(manifest)
    }

    /// Load a persisted index for querying.
    ///
    /// Fails with [`KnnError::SpaceTypeMismatch`] when `space_type` is not the
    /// space the index was built with.
    pub fn load(
        &self,
        path: &Path,
        space_type: SpaceType,
        params: &QueryParameters,
    ) -> Result<IndexHandle, KnnError> {
        params.validate()?;
        let manifest = IndexManifest::read(path)?;
        manifest.validate(space_type, self.backend.name())?;

        let space = self.backend.create_space(space_type)?;
        let mut index = self.backend.create_index(space.as_ref())?;
        index.load_index(space.as_ref(), path, &manifest)?;
        index.set_query_time_params(&params.to_backend_params())?;

        info!(
            path = ?path,
            space = %space_type,
            vectors = index.len(),
            "Loaded index"
        );
        Ok(IndexHandle {
            index,
            space,
            manifest,
        })
    }
}

/// Exclusive owner of a loaded index and its metric space.
///
/// Dropping the handle (or calling [`IndexHandle::free`]) releases the index
/// and then the space.
pub struct IndexHandle {
    // Declaration order is drop order.
    pub(crate) index: Box<dyn NativeIndex>,
    pub(crate) space: Box<dyn MetricSpace>,
    pub(crate) manifest: IndexManifest,
}

impl IndexHandle {
    pub fn space_type(&self) -> SpaceType {
        self.manifest.space_type
    }

    /// Raw dimension the index was built with.
    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Replace the query-time defaults.
    pub fn set_query_params(&mut self, params: &QueryParameters) -> Result<(), KnnError> {
        params.validate()?;
        self.index
            .set_query_time_params(&params.to_backend_params())
    }

    /// Release the index, then the space.
    pub fn free(self) {
        drop(self);
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        debug!(
            space = %self.manifest.space_type,
            vectors = self.manifest.vector_count,
            "Releasing index"
        );
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("space", &self.space.desc())
            .field("manifest", &self.manifest)
            .finish()
    }
}
