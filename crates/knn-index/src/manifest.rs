//! Index manifest.
//!
//! Written beside every backend artifact so that a load can verify the space
//! type, dimension and backend before anything is allocated.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KnnError;
use crate::params::BuildParameters;
use crate::space::SpaceType;

/// Current manifest layout version.
pub const MANIFEST_VERSION: u32 = 1;

/// Suffix appended to the index path for the manifest file.
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Metadata persisted with an index artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub space_type: SpaceType,
    pub dimension: usize,
    pub vector_count: usize,
    pub backend: String,
    #[serde(default)]
    pub build_params: BuildParameters,
    /// Build time (ms since epoch)
    pub created_at: i64,
}

impl IndexManifest {
    pub fn new(
        space_type: SpaceType,
        dimension: usize,
        vector_count: usize,
        backend: impl Into<String>,
        build_params: BuildParameters,
    ) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            space_type,
            dimension,
            vector_count,
            backend: backend.into(),
            build_params,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Manifest location for an index artifact.
    pub fn path_for(index_path: &Path) -> PathBuf {
        let mut name = index_path.as_os_str().to_owned();
        name.push(MANIFEST_SUFFIX);
        PathBuf::from(name)
    }

    pub fn write(&self, index_path: &Path) -> Result<(), KnnError> {
        let path = Self::path_for(index_path);
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes)?;
        debug!(path = ?path, "Wrote index manifest");
        Ok(())
    }

    pub fn read(index_path: &Path) -> Result<Self, KnnError> {
        let path = Self::path_for(index_path);
        let bytes = std::fs::read(&path)?;
        let manifest: IndexManifest = serde_json::from_slice(&bytes)?;
        if manifest.format_version > MANIFEST_VERSION {
            return Err(KnnError::InvalidArgument(format!(
                "index manifest version {} is newer than supported version {}",
                manifest.format_version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Check the manifest against what a load asks for.
    pub fn validate(&self, requested: SpaceType, backend: &str) -> Result<(), KnnError> {
        if self.space_type != requested {
            return Err(KnnError::SpaceTypeMismatch {
                built: self.space_type,
                requested,
            });
        }
        if self.backend != backend {
            return Err(KnnError::InvalidArgument(format!(
                "index was built by backend {:?}, cannot load with {:?}",
                self.backend, backend
            )));
        }
        Ok(())
    }
}
