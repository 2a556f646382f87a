//! # knn-index
//!
//! Approximate k-nearest-neighbor index engine.
//!
//! This crate turns batches of `(id, vector)` pairs into a persisted index for
//! one metric space, loads it back as an owned handle, and answers top-k
//! queries against it.
//!
//! ## Features
//! - Seven space types: l1, l2, linf, cosinesimil, innerproduct,
//!   jaccard_sparse, bit_jaccard
//! - Per-space vector encoding (dense floats, sparse index sets, packed bitsets)
//! - Pluggable backends: pure-Rust HNSW graph, exact scan, usearch
//! - Manifest beside every artifact so loads verify the space type
//! - Handles that release the index before its metric space

pub mod backend;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod init;
pub mod lifecycle;
pub mod manifest;
pub mod params;
pub mod query;
pub mod queue;
pub mod space;

pub use backend::{Backend, BackendKind, KnnQuery, MetricSpace, NativeIndex};
pub use dataset::{DataObject, Dataset, VectorRecord};
pub use encoding::{encode, EncodedVector, PackedBits};
pub use error::{ErrorKind, KnnError};
pub use init::{init_library, is_initialized};
pub use lifecycle::{IndexHandle, KnnEngine};
pub use manifest::IndexManifest;
pub use params::{AnyParams, BuildParameters, QueryParameters};
pub use queue::{NeighborResult, TopKQueue};
pub use space::{EncodingStrategy, SpaceType};
