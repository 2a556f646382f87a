//! CLI argument parsing for `knn-index`.
//!
//! CLI flags override every other settings source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// k-NN index tool
///
/// Build approximate nearest-neighbor indexes from JSON vectors and query them.
#[derive(Parser, Debug)]
#[command(name = "knn-index")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/knn-index/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Index backend (hnsw, exact, usearch)
    #[arg(short, long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an index from a JSON array of {"id", "vector"} records
    Build {
        /// Input JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Index output path (a manifest is written beside it)
        #[arg(short, long)]
        output: PathBuf,

        /// Space type (l1, l2, linf, cosinesimil, innerproduct, jaccard_sparse, bit_jaccard)
        #[arg(short, long)]
        space: Option<String>,

        #[arg(long)]
        ef_construction: Option<usize>,

        /// Graph out-degree
        #[arg(long)]
        m: Option<usize>,

        /// Construction threads
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Query an index for the nearest neighbors of one vector
    Query {
        /// Index path
        #[arg(short, long)]
        index: PathBuf,

        /// Space type the index was built with
        #[arg(short, long)]
        space: Option<String>,

        /// Comma-separated query vector, e.g. 1,0,-0.5
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vector: Vec<f32>,

        /// Number of neighbors
        #[arg(short, default_value = "10")]
        k: i32,

        #[arg(long)]
        ef_search: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the manifest of a built index
    Info {
        /// Index path
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Print the effective settings as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from([
            "knn-index",
            "build",
            "--input",
            "vectors.json",
            "--output",
            "idx",
            "--space",
            "cosinesimil",
            "--m",
            "24",
        ])
        .unwrap();
        match cli.command {
            Commands::Build {
                input, space, m, ..
            } => {
                assert_eq!(input, PathBuf::from("vectors.json"));
                assert_eq!(space.as_deref(), Some("cosinesimil"));
                assert_eq!(m, Some(24));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_with_negative_components() {
        let cli = Cli::try_parse_from([
            "knn-index",
            "--backend",
            "exact",
            "query",
            "--index",
            "idx",
            "--vector",
            "-1,0.5,2",
            "-k",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("exact"));
        match cli.command {
            Commands::Query { vector, k, json, .. } => {
                assert_eq!(vector, vec![-1.0, 0.5, 2.0]);
                assert_eq!(k, 3);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_query_requires_vector() {
        assert!(Cli::try_parse_from(["knn-index", "query", "--index", "idx"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["knn-index", "config", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Config));
    }
}
