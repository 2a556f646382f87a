//! Command implementations.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use knn_bridge::KnnBridge;
use knn_index::{BackendKind, IndexManifest, NeighborResult, SpaceType, VectorRecord};

use crate::cli::{Cli, Commands};
use crate::config::Settings;

/// Load settings, apply CLI overrides, set up logging and run the command.
pub fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    if let Some(backend) = cli.backend.as_deref() {
        settings.backend = backend.parse::<BackendKind>()?;
    }

    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Build {
            input,
            output,
            space,
            ef_construction,
            m,
            threads,
        } => {
            settings.space_type = space.unwrap_or(settings.space_type);
            settings.ef_construction = ef_construction.or(settings.ef_construction);
            settings.m = m.or(settings.m);
            settings.index_thread_qty = threads.or(settings.index_thread_qty);
            settings.validate().map_err(|e| anyhow!(e))?;

            let manifest = build_index(&settings, &input, &output)?;
            println!(
                "Built {} index at {} ({} vectors, dimension {}, backend {})",
                manifest.space_type,
                output.display(),
                manifest.vector_count,
                manifest.dimension,
                manifest.backend
            );
        }
        Commands::Query {
            index,
            space,
            vector,
            k,
            ef_search,
            json,
        } => {
            settings.space_type = space.unwrap_or(settings.space_type);
            settings.ef_search = ef_search.or(settings.ef_search);
            settings.validate().map_err(|e| anyhow!(e))?;

            let results = query_index(&settings, &index, &vector, k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                let space = SpaceType::from_name(&settings.space_type)?;
                print!("{}", format_results(&results, space));
            }
        }
        Commands::Info { index } => {
            let manifest = IndexManifest::read(&index)
                .with_context(|| format!("Failed to read manifest for {}", index.display()))?;
            print!("{}", format_manifest(&manifest));
        }
        Commands::Config => {
            settings.validate().map_err(|e| anyhow!(e))?;
            print!("{}", settings.to_toml()?);
        }
    }

    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Read `{"id", "vector"}` records from a JSON file.
pub fn read_records(input: &Path) -> Result<Vec<VectorRecord>> {
    let file =
        File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let records: Vec<VectorRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse records in {}", input.display()))?;
    debug!(records = records.len(), input = ?input, "Read input records");
    Ok(records)
}

/// Build an index from a JSON record file.
pub fn build_index(settings: &Settings, input: &Path, output: &Path) -> Result<IndexManifest> {
    let records = read_records(input)?;
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let vectors: Vec<Vec<f32>> = records.into_iter().map(|r| r.raw).collect();

    let bridge = KnnBridge::new(settings.backend);
    bridge.init_library();
    let manifest = bridge
        .build_index(&ids, &vectors, &settings.build_params_json(), output)
        .with_context(|| format!("Failed to build index at {}", output.display()))?;
    info!(output = ?output, vectors = manifest.vector_count, "Index built");
    Ok(manifest)
}

/// Load an index, run one query, and release the index.
pub fn query_index(
    settings: &Settings,
    index: &Path,
    vector: &[f32],
    k: i32,
) -> Result<Vec<NeighborResult>> {
    let bridge = KnnBridge::new(settings.backend);
    bridge.init_library();
    let handle = bridge
        .load_index(index, &settings.load_params_json())
        .with_context(|| format!("Failed to load index {}", index.display()))?;
    let results = bridge.query_index(handle, vector, k);
    bridge.free_index(handle)?;
    Ok(results?)
}

/// One line per neighbor: rank, id, distance and score.
pub fn format_results(results: &[NeighborResult], space: SpaceType) -> String {
    if results.is_empty() {
        return "No results\n".to_string();
    }
    let mut out = format!("{:>4}  {:>12}  {:>12}  {:>10}\n", "rank", "id", "distance", "score");
    for (rank, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:>12}  {:>12.6}  {:>10.6}\n",
            rank + 1,
            result.id,
            result.distance,
            result.score(space)
        ));
    }
    out
}

pub fn format_manifest(manifest: &IndexManifest) -> String {
    let mut out = String::new();
    out.push_str(&format!("Space type:   {}\n", manifest.space_type));
    out.push_str(&format!("Dimension:    {}\n", manifest.dimension));
    out.push_str(&format!("Vectors:      {}\n", manifest.vector_count));
    out.push_str(&format!("Backend:      {}\n", manifest.backend));
    if let Some(ef) = manifest.build_params.ef_construction {
        out.push_str(&format!("efConstruction: {}\n", ef));
    }
    if let Some(m) = manifest.build_params.m {
        out.push_str(&format!("M:            {}\n", m));
    }
    let created = DateTime::<Utc>::from_timestamp_millis(manifest.created_at)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| manifest.created_at.to_string());
    out.push_str(&format!("Created:      {}\n", created));
    out
}
