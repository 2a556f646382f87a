//! Host parameter maps.
//!
//! Build: `{"spaceType": "l2", "parameters": {"efConstruction": 200, "M": 16},
//! "indexThreadQty": 4}`. Load: `{"spaceType": "l2", "efSearch": 100}`.

use serde_json::{Map, Value};

use knn_index::{BuildParameters, KnnError, QueryParameters, SpaceType};

pub const SPACE_TYPE: &str = "spaceType";
pub const PARAMETERS: &str = "parameters";
pub const INDEX_THREAD_QTY: &str = "indexThreadQty";
pub const EF_SEARCH: &str = "efSearch";

const EF_CONSTRUCTION_KEYS: [&str; 2] = ["efConstruction", "ef_construction"];
const M_KEYS: [&str; 2] = ["M", "m"];
const EF_SEARCH_KEYS: [&str; 2] = [EF_SEARCH, "ef_search"];

/// Space type and build parameters from a build parameter map.
pub fn build_params(parameters: &Value) -> Result<(SpaceType, BuildParameters), KnnError> {
    let map = as_object(parameters, "build parameters")?;
    let space_type = space_type(map)?;

    let mut params = BuildParameters::new();
    if let Some(nested) = map.get(PARAMETERS) {
        let nested = as_object(nested, PARAMETERS)?;
        params.ef_construction = first_positive(nested, &EF_CONSTRUCTION_KEYS)?;
        params.m = first_positive(nested, &M_KEYS)?;
    }
    params.thread_count = first_positive(map, &[INDEX_THREAD_QTY])?;
    Ok((space_type, params))
}

/// Space type and query-time defaults from a load parameter map.
pub fn load_params(parameters: &Value) -> Result<(SpaceType, QueryParameters), KnnError> {
    let map = as_object(parameters, "load parameters")?;
    let space_type = space_type(map)?;
    let params = QueryParameters {
        ef_search: first_positive(map, &EF_SEARCH_KEYS)?,
    };
    Ok((space_type, params))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, KnnError> {
    value
        .as_object()
        .ok_or_else(|| KnnError::InvalidArgument(format!("{} must be a JSON object", what)))
}

fn space_type(map: &Map<String, Value>) -> Result<SpaceType, KnnError> {
    let value = map
        .get(SPACE_TYPE)
        .ok_or_else(|| KnnError::MissingParameter(SPACE_TYPE.to_string()))?;
    let name = value.as_str().ok_or_else(|| {
        KnnError::InvalidArgument(format!("{} must be a string, got {}", SPACE_TYPE, value))
    })?;
    SpaceType::from_name(name)
}

/// Value of the first present key, which must be a positive integer.
fn first_positive(map: &Map<String, Value>, keys: &[&str]) -> Result<Option<usize>, KnnError> {
    let Some((key, value)) = keys.iter().find_map(|k| map.get(*k).map(|v| (*k, v))) else {
        return Ok(None);
    };
    match value.as_u64() {
        Some(n) if n > 0 => Ok(Some(n as usize)),
        _ => Err(KnnError::InvalidArgument(format!(
            "{} must be a positive integer, got {}",
            key, value
        ))),
    }
}
