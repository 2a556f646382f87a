//! k-NN index tool
//!
//! Builds approximate nearest-neighbor indexes from JSON vectors and queries
//! them.
//!
//! # Usage
//!
//! ```bash
//! knn-index build --input vectors.json --output idx --space l2 [--m 16]
//! knn-index query --index idx --space l2 --vector 1,0 -k 2
//! knn-index info --index idx
//! knn-index config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/knn-index/config.toml)
//! 3. `--config` file
//! 4. Environment variables (KNN_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use knn_cli::{run, Cli};

fn main() -> Result<()> {
    run(Cli::parse())
}
