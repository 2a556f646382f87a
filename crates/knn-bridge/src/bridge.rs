//! Host-facing operations.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use knn_index::{
    init_library, BackendKind, IndexManifest, KnnEngine, KnnError, NeighborResult, SpaceType,
};

use crate::handles::HandleTable;
use crate::params::{build_params, load_params};

/// One index to preload.
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupEntry {
    pub path: PathBuf,
    #[serde(rename = "spaceType")]
    pub space_type: String,
}

impl WarmupEntry {
    pub fn new(path: impl Into<PathBuf>, space_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            space_type: space_type.into(),
        }
    }
}

/// Build, load, query and free indexes by opaque handle.
pub struct KnnBridge {
    engine: KnnEngine,
    handles: HandleTable,
}

impl Default for KnnBridge {
    fn default() -> Self {
        Self::new(BackendKind::default())
    }
}

impl KnnBridge {
    pub fn new(kind: BackendKind) -> Self {
        Self::with_engine(KnnEngine::with_kind(kind))
    }

    pub fn with_engine(engine: KnnEngine) -> Self {
        Self {
            engine,
            handles: HandleTable::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.engine.backend_name()
    }

    /// Process-wide initialization. Idempotent.
    pub fn init_library(&self) {
        init_library();
    }

    /// Build an index from parallel id / vector lists and persist it.
    pub fn build_index(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        parameters: &Value,
        output_path: impl AsRef<Path>,
    ) -> Result<IndexManifest, KnnError> {
        let (space_type, params) = build_params(parameters)?;
        self.engine
            .build(ids, vectors, space_type, &params, output_path.as_ref())
    }

    /// Load a persisted index and return its handle id.
    pub fn load_index(&self, path: impl AsRef<Path>, parameters: &Value) -> Result<u64, KnnError> {
        let path = path.as_ref();
        let (space_type, params) = load_params(parameters)?;
        let handle = self.engine.load(path, space_type, &params)?;
        let id = self.handles.insert(handle, path);
        info!(handle = id, path = ?path, "Registered index handle");
        Ok(id)
    }

    /// Up to `k` nearest neighbors, nearest first.
    pub fn query_index(
        &self,
        handle: u64,
        query: &[f32],
        k: i32,
    ) -> Result<Vec<NeighborResult>, KnnError> {
        if k <= 0 {
            return Err(KnnError::InvalidArgument(format!(
                "k must be a positive integer, got {}",
                k
            )));
        }
        let index = self.handles.get(handle)?;
        debug!(handle = handle, k = k, "Query");
        index.query(query, k as usize)
    }

    /// Release a handle. Zero is a no-op; unknown or already freed ids fail
    /// with [`KnnError::InvalidHandle`].
    pub fn free_index(&self, handle: u64) -> Result<(), KnnError> {
        if handle == 0 {
            return Ok(());
        }
        self.handles.remove(handle)?;
        info!(handle = handle, "Freed index handle");
        Ok(())
    }

    /// Load every entry not already loaded and return the handle id of each,
    /// in input order.
    pub fn warmup(&self, entries: &[WarmupEntry]) -> Result<Vec<u64>, KnnError> {
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let space_type = SpaceType::from_name(&entry.space_type)?;
            if let Some(id) = self.handles.find_by_path(&entry.path) {
                let loaded = self.handles.get(id)?.space_type();
                if loaded != space_type {
                    return Err(KnnError::SpaceTypeMismatch {
                        built: loaded,
                        requested: space_type,
                    });
                }
                debug!(handle = id, path = ?entry.path, "Already warm");
                ids.push(id);
                continue;
            }
            let id = self.load_index(
                &entry.path,
                &serde_json::json!({ "spaceType": space_type.name() }),
            )?;
            ids.push(id);
        }
        info!(indexes = ids.len(), "Warmup complete");
        Ok(ids)
    }

    /// Number of live handles.
    pub fn loaded(&self) -> usize {
        self.handles.len()
    }
}
