//! k-NN index error types.

use thiserror::Error;

use crate::space::SpaceType;

/// Errors that can occur while encoding, building, loading or querying an index.
#[derive(Debug, Error)]
pub enum KnnError {
    /// Null, empty or otherwise unusable input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Required parameter key absent
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Vector lengths disagree, or ids and vectors have different counts
    #[error("Dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Unrecognized space-type name
    #[error("Unsupported space type: {0:?}")]
    UnsupportedSpaceType(String),

    /// The encoding for a space type cannot represent the input
    #[error("Encoding constraint violated for {space}: {reason}")]
    EncodingConstraint { space: SpaceType, reason: String },

    /// The index backend reported an internal failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Null, zero or unknown handle
    #[error("Invalid index handle: {0}")]
    InvalidHandle(u64),

    /// Space type requested at load disagrees with the one the index was built with
    #[error("Space type mismatch: index was built with {built}, requested {requested}")]
    SpaceTypeMismatch {
        built: SpaceType,
        requested: SpaceType,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse failure category, for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    MissingParameter,
    DimensionMismatch,
    UnsupportedSpaceType,
    EncodingConstraintViolation,
    NativeBackendFailure,
    InvalidHandle,
    SpaceTypeMismatch,
    Io,
}

impl KnnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KnnError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KnnError::MissingParameter(_) => ErrorKind::MissingParameter,
            KnnError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            KnnError::UnsupportedSpaceType(_) => ErrorKind::UnsupportedSpaceType,
            KnnError::EncodingConstraint { .. } => ErrorKind::EncodingConstraintViolation,
            KnnError::Backend(_) | KnnError::Serialization(_) => ErrorKind::NativeBackendFailure,
            KnnError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            KnnError::SpaceTypeMismatch { .. } => ErrorKind::SpaceTypeMismatch,
            KnnError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for KnnError {
    fn from(e: serde_json::Error) -> Self {
        KnnError::Serialization(e.to_string())
    }
}
