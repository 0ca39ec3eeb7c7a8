use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facefind_core::{validator, FaceEmbedder, FaceEncoder, PerceptualHasher};
use facefind_search::{catalog_registry, SearchAggregator, SearchConfig, SearchReport, SourceReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facefind", about = "Find profiles matching a face or a name")]
struct Cli {
    /// Config file (defaults to $FACEFIND_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reverse image search: rank profiles by similarity to a photo
    Image {
        /// Query image (JPEG, PNG, ...)
        path: PathBuf,
        /// Per-source result cap
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search profiles by display name or username
    Name {
        name: String,
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show the perceptual hash and detected faces of an image
    Inspect { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SearchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Image {
            path,
            max_results,
            json,
        } => {
            apply_max_results(&mut config, max_results);
            let bytes = read_image(&path)?;
            let aggregator = build_aggregator(&config)?;
            let report = aggregator.search_by_image(bytes).await?;

            if json {
                print_json(&report)?;
            } else {
                if report.query_face_detected == Some(false) {
                    println!("No face detected in query; ranked by perceptual hash.");
                }
                for (rank, hit) in report.results.iter().enumerate() {
                    println!(
                        "{:>3}. {:.3} [{:?}] {:<10} {}{}",
                        rank + 1,
                        hit.similarity,
                        hit.method,
                        hit.candidate.source,
                        hit.candidate.url,
                        label(hit.candidate.display_name.as_deref()),
                    );
                }
                print_sources(&report);
            }
        }
        Commands::Name {
            name,
            max_results,
            json,
        } => {
            apply_max_results(&mut config, max_results);
            let aggregator = build_aggregator(&config)?;
            let report = aggregator.search_by_name(&name).await?;

            if json {
                print_json(&report)?;
            } else {
                for hit in &report.results {
                    println!(
                        "{:<10} {}{}",
                        hit.source,
                        hit.url,
                        label(hit.display_name.as_deref().or(hit.username.as_deref())),
                    );
                }
                print_sources(&report);
            }
        }
        Commands::Inspect { path } => {
            let bytes = read_image(&path)?;
            let image = validator::decode_rgb(&bytes)
                .with_context(|| format!("decoding {}", path.display()))?;
            let hash = PerceptualHasher::new().hash(&image);

            let encoder = FaceEncoder::load(&config.model_dir);
            let faces = encoder.encode_image(&image);

            println!("Image:   {} ({}x{})", path.display(), image.width(), image.height());
            println!("pHash:   {hash}");
            if encoder.is_degraded() {
                println!("Faces:   unavailable (models not loaded from {})", config.model_dir.display());
            } else {
                println!("Faces:   {}", faces.len());
                if let Some(first) = faces.first() {
                    println!(
                        "Embedding: {} dims, model {}",
                        first.dim(),
                        first.model_version.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    Ok(())
}

fn apply_max_results(config: &mut SearchConfig, max_results: Option<usize>) {
    if let Some(n) = max_results.filter(|&n| n > 0) {
        config.max_results_per_source = n;
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn build_aggregator(config: &SearchConfig) -> Result<SearchAggregator> {
    let embedder: Arc<dyn FaceEmbedder> = Arc::new(FaceEncoder::load(&config.model_dir));
    let registry = catalog_registry(config, Arc::clone(&embedder))
        .context("building thumbnail fetcher")?;
    if config.catalogs.is_empty() {
        tracing::warn!("no [catalogs] configured; every source will report unavailable");
    }
    Ok(SearchAggregator::from_config(config, registry, embedder))
}

fn print_json<T: Serialize>(report: &SearchReport<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn label(name: Option<&str>) -> String {
    name.map(|n| format!("  ({n})")).unwrap_or_default()
}

fn print_sources<T>(report: &SearchReport<T>) {
    println!();
    println!("Search {}: {} result(s)", report.search_id, report.results.len());
    for SourceReport {
        source,
        status,
        result_count,
        elapsed_ms,
    } in &report.sources
    {
        let elapsed = elapsed_ms.map(|ms| format!(" in {ms} ms")).unwrap_or_default();
        println!("  {source:<10} {status:?}: {result_count} result(s){elapsed}");
    }
    if report.all_sources_failed() {
        eprintln!("warning: no source completed; results are empty because every source failed");
    }
}
