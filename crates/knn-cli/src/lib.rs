//! knn-index command-line front end.
//!
//! Exposes CLI parsing, settings and command handlers as a library so they
//! can be tested without spawning the binary.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands};
pub use commands::{build_index, format_manifest, format_results, query_index, read_records, run};
pub use config::Settings;
