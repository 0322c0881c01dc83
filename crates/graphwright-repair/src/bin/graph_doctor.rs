use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphwright_core::{
    BlockCatalog, BlockDefinition, GraphDocument, GraphFixer, PatchIntent, apply_patch,
    validate_graph,
};
use graphwright_repair::RepairConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ── CLI ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "graph-doctor", about = "Validate, fix and patch workflow graphs")]
struct Cli {
    /// Path to repair config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Block catalog JSON; defaults to the configured cache
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Also write JSON logs to this directory, rotated daily
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report every violation in a graph
    Validate { graph: PathBuf },
    /// Run the fixer pipeline and print the fixed graph
    Fix {
        graph: PathBuf,
        /// Skip rules that need the block catalog
        #[arg(long)]
        no_catalog: bool,
    },
    /// Apply a patch document and print the result
    Patch { graph: PathBuf, patch: PathBuf },
    /// Store a freshly fetched block list in the catalog cache
    Cache { blocks: PathBuf },
}

#[derive(Serialize)]
struct FixReport<'a> {
    graph: &'a GraphDocument,
    applied: Vec<String>,
}

// ── Helpers ─────────────────────────────────────────────────────

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(console).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log dir: {}", dir.display()))?;
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("graph-doctor")
        .filename_suffix("txt")
        .build(dir)
        .context("Failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("trace")),
        )
        .init();
    Ok(Some(guard))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_catalog(cli_path: Option<&Path>, config: &RepairConfig) -> Result<BlockCatalog> {
    if let Some(path) = cli_path {
        let blocks: Vec<BlockDefinition> = read_json(path)?;
        return Ok(BlockCatalog::new(blocks));
    }
    let cached = config.catalog_cache().get()?;
    info!("Using {:?} catalog with {} blocks", cached.source, cached.catalog.len());
    Ok(cached.catalog)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Main ────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    let config = match &cli.config {
        Some(path) => RepairConfig::load(path)?,
        None => RepairConfig::default(),
    };

    match &cli.command {
        Command::Validate { graph } => {
            let graph: GraphDocument = read_json(graph)?;
            let catalog = load_catalog(cli.catalog.as_deref(), &config)?;
            let report = validate_graph(&graph, &catalog);
            println!("{}", report.render());
            if !report.is_ok() {
                std::process::exit(1);
            }
        }
        Command::Fix { graph, no_catalog } => {
            let graph: GraphDocument = read_json(graph)?;
            let catalog = if *no_catalog {
                None
            } else {
                Some(load_catalog(cli.catalog.as_deref(), &config)?)
            };
            let outcome = GraphFixer::new(config.fixer_settings()).fix(&graph, catalog.as_ref());
            print_json(&FixReport {
                graph: &outcome.graph,
                applied: outcome
                    .applied
                    .iter()
                    .map(|fix| format!("[{}] {}", fix.rule, fix.description))
                    .collect(),
            })?;
        }
        Command::Patch { graph, patch } => {
            let graph: GraphDocument = read_json(graph)?;
            let content = std::fs::read_to_string(patch)
                .with_context(|| format!("Failed to read {}", patch.display()))?;
            let intent = PatchIntent::from_json_str(&content)?;
            info!("Applying {} patch operation(s): {}", intent.operations.len(), intent.intent);
            print_json(&apply_patch(&graph, &intent)?)?;
        }
        Command::Cache { blocks } => {
            let blocks: Vec<BlockDefinition> = read_json(blocks)?;
            let cache = config.catalog_cache();
            let metadata = cache.store(&blocks)?;
            println!(
                "Cached {} blocks at {}",
                metadata.block_count,
                cache.cache_path().display()
            );
        }
    }

    Ok(())
}
