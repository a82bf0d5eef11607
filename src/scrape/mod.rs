pub mod extract;

pub use extract::{extract_locations, ExtractStrategy};

use crate::cache::Cache;
use crate::config::ScraperConfig;
use crate::constants::{locations_page_url, EXPAND_SELECTORS, NS_LOCATIONS};
use crate::error::{EnrichError, Result};
use crate::types::RawLocation;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Scrapes raw filming-location mentions off a title's location-listing page
/// with an isolated headless browser session per title. Results are cached
/// by title id, empty ones included, so a page that genuinely lists no
/// locations is only ever rendered once.
pub struct LocationScraper {
    cache: Cache,
    config: ScraperConfig,
}

impl LocationScraper {
    pub fn new(cache: Cache, config: ScraperConfig) -> Self {
        Self { cache, config }
    }

    #[instrument(skip(self))]
    pub async fn scrape(&self, imdb_id: &str) -> Result<Vec<RawLocation>> {
        if let Some(cached) = self.cache.get_as::<Vec<RawLocation>>(NS_LOCATIONS, imdb_id) {
            debug!("location cache hit for {}", imdb_id);
            return Ok(cached);
        }

        let (mut browser, handler_task) = launch_browser(&self.config).await?;
        let outcome = self.scrape_in_session(&browser, imdb_id).await;

        // The session is torn down on every path; a leaked browser process
        // outlives the run and starves later batches.
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {}", e);
        }
        let _ = browser.wait().await;
        handler_task.abort();

        match outcome {
            Ok(Some(locations)) => {
                info!("scraped {} raw locations for {}", locations.len(), imdb_id);
                self.cache.put(NS_LOCATIONS, imdb_id, &locations);
                Ok(locations)
            }
            // Navigation never completed: soft failure, and deliberately not
            // cached. A transient network error must not read as "no
            // locations" forever.
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn scrape_in_session(
        &self,
        browser: &Browser,
        imdb_id: &str,
    ) -> Result<Option<Vec<RawLocation>>> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EnrichError::Browser(e.to_string()))?;

        let url = locations_page_url(imdb_id);
        let nav_timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        match tokio::time::timeout(nav_timeout, page.goto(url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("navigation failed for {}: {}", url, e);
                return Ok(None);
            }
            Err(_) => {
                warn!("navigation timed out after {:?} for {}", nav_timeout, url);
                return Ok(None);
            }
        }
        let _ = tokio::time::timeout(nav_timeout, page.wait_for_navigation()).await;

        self.expand_all(&page).await;

        let html = page
            .content()
            .await
            .map_err(|e| EnrichError::Browser(e.to_string()))?;
        let (locations, strategy) = extract_locations(&html);
        if locations.is_empty() {
            warn!("no locations extracted for {} - the page structure may have changed", imdb_id);
        } else {
            debug!("extraction strategy '{}' won for {}", strategy, imdb_id);
        }
        Ok(Some(locations))
    }

    /// Clicks through "show more" controls until none is left, bounded by
    /// `max_expand_rounds` so a page that never stabilizes cannot wedge the
    /// pipeline.
    async fn expand_all(&self, page: &Page) {
        let settle = Duration::from_millis(self.config.settle_ms);

        for round in 0..self.config.max_expand_rounds {
            let mut clicked = false;
            for selector in EXPAND_SELECTORS {
                let Ok(element) = page.find_element(*selector).await else {
                    continue;
                };
                let _ = element.scroll_into_view().await;
                match element.click().await {
                    Ok(_) => {
                        debug!("expand round {}: clicked '{}'", round + 1, selector);
                        clicked = true;
                        tokio::time::sleep(settle).await;
                    }
                    Err(e) => debug!("expand click failed on '{}': {}", selector, e),
                }
                break;
            }
            if !clicked {
                break;
            }
        }
    }
}

async fn launch_browser(config: &ScraperConfig) -> Result<(Browser, JoinHandle<()>)> {
    let browser_config = BrowserConfig::builder()
        .no_sandbox()
        .request_timeout(Duration::from_secs(config.navigation_timeout_secs))
        .build()
        .map_err(EnrichError::Browser)?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| EnrichError::Browser(e.to_string()))?;

    // The handler stream must be polled for the whole session or CDP
    // messages stall.
    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    Ok((browser, handler_task))
}
