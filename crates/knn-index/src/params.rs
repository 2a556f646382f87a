//! Build and query parameters.
//!
//! Typed parameters are translated into backend `name=value` strings, and
//! only fields that are present are passed on, so an absent field always
//! means "backend default".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KnnError;

/// Backend parameter name for build-time search depth.
pub const EF_CONSTRUCTION: &str = "efConstruction";
/// Backend parameter name for graph connectivity.
pub const M: &str = "M";
/// Backend parameter name for construction threads.
pub const INDEX_THREAD_QTY: &str = "indexThreadQty";
/// Backend parameter name for query-time search depth.
pub const EF_SEARCH: &str = "efSearch";

/// Construction-time tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<usize>,
}

impl BuildParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = Some(ef);
        self
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = Some(m);
        self
    }

    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = Some(threads);
        self
    }

    pub fn validate(&self) -> Result<(), KnnError> {
        require_positive(EF_CONSTRUCTION, self.ef_construction)?;
        require_positive(M, self.m)?;
        require_positive(INDEX_THREAD_QTY, self.thread_count)
    }

    /// Backend parameter strings, present fields only.
    pub fn to_backend_params(&self) -> AnyParams {
        let mut params = AnyParams::default();
        if let Some(ef) = self.ef_construction {
            params.push(EF_CONSTRUCTION, ef);
        }
        if let Some(m) = self.m {
            params.push(M, m);
        }
        if let Some(threads) = self.thread_count {
            params.push(INDEX_THREAD_QTY, threads);
        }
        params
    }
}

/// Query-time defaults applied when an index is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_search: Option<usize>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = Some(ef);
        self
    }

    pub fn validate(&self) -> Result<(), KnnError> {
        require_positive(EF_SEARCH, self.ef_search)
    }

    pub fn to_backend_params(&self) -> AnyParams {
        let mut params = AnyParams::default();
        if let Some(ef) = self.ef_search {
            params.push(EF_SEARCH, ef);
        }
        params
    }
}

fn require_positive(name: &str, value: Option<usize>) -> Result<(), KnnError> {
    match value {
        Some(0) => Err(KnnError::InvalidArgument(format!(
            "{} must be a positive integer",
            name
        ))),
        _ => Ok(()),
    }
}

/// Ordered list of `name=value` backend parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnyParams {
    entries: Vec<(String, String)>,
}

impl AnyParams {
    /// Parse `name=value` strings.
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self, KnnError> {
        let mut params = AnyParams::default();
        for item in items {
            let item = item.as_ref();
            let (name, value) = item.split_once('=').ok_or_else(|| {
                KnnError::InvalidArgument(format!("malformed parameter {:?}, expected name=value", item))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(KnnError::InvalidArgument(format!(
                    "malformed parameter {:?}, empty name",
                    item
                )));
            }
            params.push(name, value.trim());
        }
        Ok(params)
    }

    pub fn push(&mut self, name: &str, value: impl fmt::Display) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a present parameter as a positive integer.
    pub fn get_usize(&self, name: &str) -> Result<Option<usize>, KnnError> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        match raw.parse::<usize>() {
            Ok(0) | Err(_) => Err(KnnError::Backend(format!(
                "parameter {} expects a positive integer, got {:?}",
                name, raw
            ))),
            Ok(v) => Ok(Some(v)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Fail on the first name outside `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<(), KnnError> {
        match self.names().find(|n| !known.contains(n)) {
            Some(unknown) => Err(KnnError::Backend(format!(
                "unknown parameter {:?}",
                unknown
            ))),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for AnyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}
