//! # knn-bridge
//!
//! Host boundary for knn-index.
//!
//! Hosts pass parameters as JSON maps and hold indexes by opaque `u64`
//! handles. Every failure is returned as a typed [`KnnError`]; nothing at
//! this layer panics on bad input or stale handles.

pub mod bridge;
pub mod handles;
pub mod params;

pub use bridge::{KnnBridge, WarmupEntry};
pub use handles::HandleTable;
pub use knn_index::{ErrorKind, KnnError, NeighborResult};
