use clap::Parser;
use setmap_scraper::cache::{Cache, FsCacheStore};
use setmap_scraper::catalog::CatalogStore;
use setmap_scraper::config::Config;
use setmap_scraper::error::{EnrichError, Result};
use setmap_scraper::geocode::{GeocodeBackend, GeocodeQueue, GeocodingResolver, NominatimBackend};
use setmap_scraper::logging;
use setmap_scraper::pipeline::EnrichPipeline;
use setmap_scraper::provider::{IdentityResolver, MetadataFetcher, TitleProvider, TmdbProvider};
use setmap_scraper::scrape::LocationScraper;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "setmap_scraper")]
#[command(about = "SetMap filming-location discovery and geocoding pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Maximum number of titles to enrich this run (default: all pending)
    count: Option<usize>,

    /// Clear resume state before running, re-enriching everything
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("fatal: {}", e);
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    // The metadata provider is useless without a credential; fail fast
    // before any work starts.
    let api_key = std::env::var("TMDB_API_KEY")
        .map_err(|_| EnrichError::Config("TMDB_API_KEY is not set".to_string()))?;

    let input_path = std::env::var("SETMAP_INPUT_FILE")
        .unwrap_or_else(|_| "input/titles.txt".to_string());
    let ids = read_input_ids(&input_path)?;
    info!("loaded {} ids from {}", ids.len(), input_path);

    let mut catalog = CatalogStore::new(&config.paths.catalog, &config.paths.resume);
    if cli.reset {
        catalog.reset_resume()?;
        println!("🧹 Resume state cleared");
    }

    if ids.is_empty() {
        println!("Nothing to do: {input_path} lists no ids");
        return Ok(());
    }

    // One HTTP client, one cache, and exactly one geocode queue for the
    // whole run; every producer gets a handle to the same queue.
    let http = reqwest::Client::new();
    let cache = Cache::new(Arc::new(FsCacheStore::new(&config.paths.cache_dir)));
    let provider: Arc<dyn TitleProvider> = Arc::new(TmdbProvider::new(http.clone(), api_key));
    let queue = Arc::new(GeocodeQueue::new(Duration::from_millis(
        config.geocoding.min_interval_ms,
    )));
    let backend: Arc<dyn GeocodeBackend> = Arc::new(NominatimBackend::new(
        http,
        config.geocoding.endpoint.clone(),
    ));

    let pipeline = Arc::new(EnrichPipeline::new(
        IdentityResolver::new(Arc::clone(&provider), cache.clone()),
        MetadataFetcher::new(
            provider,
            cache.clone(),
            Duration::from_millis(config.metadata.delay_ms),
        ),
        LocationScraper::new(cache.clone(), config.scraper.clone()),
        GeocodingResolver::new(backend, cache, queue),
        &config.pipeline,
    ));

    println!("🚀 Enriching up to {} titles...", cli.count.map_or("all".to_string(), |n| n.to_string()));
    let summary = pipeline.run(ids, cli.count, &mut catalog).await?;

    println!("\n📊 Run complete:");
    println!("   Persisted: {}", summary.persisted);
    println!("   Skipped:   {}", summary.skipped);
    println!("   Failed:    {}", summary.failed);
    println!("   Resumed:   {} (already enriched)", summary.already_processed);
    if !summary.notes.is_empty() {
        println!("\n⚠️  Details:");
        for note in &summary.notes {
            println!("   - {note}");
        }
    }

    Ok(())
}

/// Reads the id list: one id per line, blank lines and `#` comments
/// ignored, duplicates removed in first-seen order.
fn read_input_ids(path: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| EnrichError::Config(format!("cannot read input file '{path}': {e}")))?;

    let mut seen = HashSet::new();
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(String::from)
        .collect())
}
