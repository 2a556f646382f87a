//! Opaque handle table.
//!
//! Hosts refer to loaded indexes by `u64` ids. Zero is never issued. Entries
//! hold an `Arc`, so a query that already fetched its handle keeps the index
//! alive even if the host frees the id concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use knn_index::{IndexHandle, KnnError};

/// Resolve `.`/`..` and symlinks so one file always maps to one key. Paths
/// that cannot be resolved are kept as given.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

struct HandleEntry {
    handle: Arc<IndexHandle>,
    path: PathBuf,
}

/// Registry of loaded indexes keyed by host handle id.
pub struct HandleTable {
    next_id: AtomicU64,
    entries: RwLock<HashMap<u64, HandleEntry>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a loaded index and return its id.
    pub fn insert(&self, handle: IndexHandle, path: &Path) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            id,
            HandleEntry {
                handle: Arc::new(handle),
                path: normalize(path),
            },
        );
        id
    }

    pub fn get(&self, id: u64) -> Result<Arc<IndexHandle>, KnnError> {
        self.entries
            .read()
            .get(&id)
            .map(|entry| entry.handle.clone())
            .ok_or(KnnError::InvalidHandle(id))
    }

    /// Remove an entry. The index is released once no query holds it.
    pub fn remove(&self, id: u64) -> Result<(), KnnError> {
        self.entries
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(KnnError::InvalidHandle(id))
    }

    /// Id of an index loaded from `path`, if any.
    pub fn find_by_path(&self, path: &Path) -> Option<u64> {
        let path = normalize(path);
        self.entries
            .read()
            .iter()
            .find(|(_, entry)| entry.path == path)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
