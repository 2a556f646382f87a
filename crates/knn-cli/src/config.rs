//! Layered settings for the `knn-index` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use knn_index::{BackendKind, SpaceType};

/// Prefix for environment overrides (`KNN_SPACE_TYPE`, `KNN_EF_SEARCH`, ...).
pub const ENV_PREFIX: &str = "KNN";

/// Effective CLI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Index backend (hnsw, exact, usearch)
    #[serde(default)]
    pub backend: BackendKind,

    /// Space type name used when a command does not pass `--space`
    #[serde(default = "default_space_type")]
    pub space_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_thread_qty: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_search: Option<usize>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_space_type() -> String {
    SpaceType::default().name().to_string()
}

/// Directory holding the default `config.toml`.
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("", "", "knn-index")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend: BackendKind::default(),
            space_type: default_space_type(),
            ef_construction: None,
            m: None,
            index_thread_qty: None,
            ef_search: None,
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/knn-index/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (KNN_*)
    ///
    /// CLI flags are applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self> {
        let default_config_path = config_dir().join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("backend", BackendKind::default().name())?
            .set_default("space_type", default_space_type())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // No separator: KNN_EF_CONSTRUCTION maps to `ef_construction`.
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder.build().context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn validate(&self) -> Result<(), String> {
        SpaceType::from_name(&self.space_type).map_err(|e| e.to_string())?;
        for (name, value) in [
            ("ef_construction", self.ef_construction),
            ("m", self.m),
            ("index_thread_qty", self.index_thread_qty),
            ("ef_search", self.ef_search),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be a positive integer", name));
            }
        }
        Ok(())
    }

    /// Build parameter map in the host format.
    pub fn build_params_json(&self) -> Value {
        let mut nested = Map::new();
        if let Some(ef) = self.ef_construction {
            nested.insert("efConstruction".to_string(), ef.into());
        }
        if let Some(m) = self.m {
            nested.insert("M".to_string(), m.into());
        }

        let mut params = json!({
            "spaceType": self.space_type,
            "parameters": nested,
        });
        if let Some(threads) = self.index_thread_qty {
            params["indexThreadQty"] = threads.into();
        }
        params
    }

    /// Load parameter map in the host format.
    pub fn load_params_json(&self) -> Value {
        let mut params = json!({ "spaceType": self.space_type });
        if let Some(ef) = self.ef_search {
            params["efSearch"] = ef.into();
        }
        params
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render settings")
    }
}
