use crate::catalog::CatalogStore;
use crate::config::PipelineConfig;
use crate::dedupe::dedupe_locations;
use crate::error::{EnrichError, Result};
use crate::geocode::GeocodingResolver;
use crate::provider::{IdentityResolver, MetadataFetcher};
use crate::scrape::LocationScraper;
use crate::types::{ContentRecord, Location};
use metrics::{counter, histogram};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Stages of one item's enrichment. The terminal stage lands in the item's
/// report; a failure keeps the stage it died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Pending,
    ResolvingId,
    FetchingMetadata,
    ScrapingLocations,
    Geocoding,
    Deduping,
    Persisted,
    Skipped,
    Failed,
}

impl std::fmt::Display for ItemStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemStage::Pending => "pending",
            ItemStage::ResolvingId => "resolving_id",
            ItemStage::FetchingMetadata => "fetching_metadata",
            ItemStage::ScrapingLocations => "scraping_locations",
            ItemStage::Geocoding => "geocoding",
            ItemStage::Deduping => "deduping",
            ItemStage::Persisted => "persisted",
            ItemStage::Skipped => "skipped",
            ItemStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum ItemOutcome {
    Persisted(Box<ContentRecord>),
    Skipped { id: String, reason: String },
    Failed { id: String, stage: ItemStage, error: String },
}

/// Result of a complete enrichment run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Ids skipped up front because the resume state already lists them.
    pub already_processed: usize,
    pub notes: Vec<String>,
}

/// Drives the whole enrichment flow: batches of concurrent item pipelines,
/// each walking identity → metadata → scrape → geocode → dedupe, with a
/// catalog flush and resume-state update after every batch. Per-item
/// failures are folded into the summary; only persistence failures abort
/// the run.
pub struct EnrichPipeline {
    resolver: IdentityResolver,
    fetcher: MetadataFetcher,
    scraper: LocationScraper,
    geocoder: GeocodingResolver,
    batch_size: usize,
    rescrape_processed: bool,
}

impl EnrichPipeline {
    pub fn new(
        resolver: IdentityResolver,
        fetcher: MetadataFetcher,
        scraper: LocationScraper,
        geocoder: GeocodingResolver,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            scraper,
            geocoder,
            batch_size: config.batch_size.max(1),
            rescrape_processed: config.rescrape_processed,
        }
    }

    #[instrument(skip(self, ids, catalog), fields(total = ids.len()))]
    pub async fn run(
        self: Arc<Self>,
        ids: Vec<String>,
        target: Option<usize>,
        catalog: &mut CatalogStore,
    ) -> Result<RunSummary> {
        let run_start = std::time::Instant::now();
        counter!("setmap_runs_total").increment(1);

        let mut summary = RunSummary::default();

        // Resume filter runs before anything touches the network: a resumed
        // id costs zero provider calls.
        let resume = catalog.load_resume();
        let mut pending: Vec<String> = ids
            .into_iter()
            .filter(|id| {
                if !self.rescrape_processed && resume.contains(id) {
                    summary.already_processed += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        // The target count bounds fresh work per run; the catalog grows by
        // at most this many titles per invocation.
        if let Some(n) = target {
            pending.truncate(n);
        }

        if summary.already_processed > 0 {
            info!("{} ids already enriched, skipping", summary.already_processed);
            println!("⏭️  {} ids already enriched, skipping", summary.already_processed);
        }

        let batch_count = pending.len().div_ceil(self.batch_size);
        for (batch_index, batch) in pending.chunks(self.batch_size).enumerate() {
            info!("starting batch {}/{}", batch_index + 1, batch_count);
            println!(
                "🎬 Batch {}/{} ({} titles)...",
                batch_index + 1,
                batch_count,
                batch.len()
            );

            let mut handles = Vec::new();
            for id in batch {
                let pipeline = Arc::clone(&self);
                let id = id.clone();
                handles.push(tokio::spawn(async move { pipeline.process_item(id).await }));
            }

            let mut records = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok(ItemOutcome::Persisted(record)) => records.push(*record),
                    Ok(ItemOutcome::Skipped { id, reason }) => {
                        summary.skipped += 1;
                        summary.notes.push(format!("{id}: skipped ({reason})"));
                    }
                    Ok(ItemOutcome::Failed { id, stage, error }) => {
                        summary.failed += 1;
                        summary.notes.push(format!("{id}: failed at {stage} ({error})"));
                    }
                    Err(e) => {
                        summary.failed += 1;
                        summary.notes.push(format!("item task panicked: {e}"));
                    }
                }
            }

            // Flush after every batch; a crash mid-run loses at most one
            // batch of work.
            if !records.is_empty() {
                let flush_start = std::time::Instant::now();
                catalog.merge_batch(&records)?;
                catalog.mark_processed(records.iter().map(|record| record.id.clone()))?;
                histogram!("setmap_batch_flush_duration_seconds")
                    .record(flush_start.elapsed().as_secs_f64());
                summary.persisted += records.len();
            }

            counter!("setmap_items_persisted_total").increment(records.len() as u64);
            println!(
                "   ✅ {} persisted, {} skipped, {} failed so far",
                summary.persisted, summary.skipped, summary.failed
            );
        }

        counter!("setmap_items_skipped_total").increment(summary.skipped as u64);
        counter!("setmap_items_failed_total").increment(summary.failed as u64);
        histogram!("setmap_run_duration_seconds").record(run_start.elapsed().as_secs_f64());

        Ok(summary)
    }

    async fn process_item(&self, id: String) -> ItemOutcome {
        let mut stage = ItemStage::Pending;
        match self.enrich_item(&id, &mut stage).await {
            Ok(Some(record)) => {
                info!("persisted {} with {} locations", id, record.locations.len());
                ItemOutcome::Persisted(Box::new(record))
            }
            Ok(None) => {
                info!("skipping {}: no usable locations", id);
                ItemOutcome::Skipped {
                    id,
                    reason: "no usable locations".to_string(),
                }
            }
            Err(EnrichError::NotFound(_)) => {
                info!("skipping {}: unknown to the metadata provider", id);
                ItemOutcome::Skipped {
                    id,
                    reason: "unknown to the metadata provider".to_string(),
                }
            }
            Err(e) => {
                error!("{} failed at {}: {}", id, stage, e);
                ItemOutcome::Failed {
                    id,
                    stage,
                    error: e.to_string(),
                }
            }
        }
    }

    /// The per-item state machine. Returns `None` when the item yields no
    /// locations (terminal SKIPPED, not written).
    async fn enrich_item(&self, id: &str, stage: &mut ItemStage) -> Result<Option<ContentRecord>> {
        *stage = ItemStage::ResolvingId;
        let provider_ref = self.resolver.resolve(id).await?;

        *stage = ItemStage::FetchingMetadata;
        let metadata = self.fetcher.fetch(&provider_ref).await?;

        *stage = ItemStage::ScrapingLocations;
        let raw_locations = self.scraper.scrape(id).await?;
        if raw_locations.is_empty() {
            return Ok(None);
        }

        *stage = ItemStage::Geocoding;
        let mut locations = Vec::new();
        let mut dropped = 0usize;
        for raw in raw_locations {
            match self.geocoder.resolve(&raw.place).await {
                Some(place) => locations.push(Location {
                    lat: place.lat,
                    lng: place.lng,
                    city: place.city,
                    country: place.country,
                    description: raw.place,
                    scene_description: raw.scene,
                }),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!("{}: dropped {} mentions the geocoder could not place", id, dropped);
        }
        counter!("setmap_locations_geocoded_total").increment(locations.len() as u64);
        if locations.is_empty() {
            return Ok(None);
        }

        *stage = ItemStage::Deduping;
        let locations = dedupe_locations(locations);

        *stage = ItemStage::Persisted;
        Ok(Some(ContentRecord {
            id: id.to_string(),
            title: metadata.title,
            year: metadata.year,
            imdb_id: id.to_string(),
            tmdb_id: provider_ref.tmdb_id,
            content_type: provider_ref.content_type,
            genres: metadata.genres,
            poster: metadata.poster,
            trailer: metadata.trailer,
            rating: metadata.rating,
            locations,
        }))
    }
}
