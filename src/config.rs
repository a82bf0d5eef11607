use crate::error::Result;
use serde::Deserialize;
use std::fs;

/// Runtime tunables, loaded from `config.toml` next to the binary. Every
/// field has a default so a missing file just means "run with defaults";
/// a file that exists but does not parse is a configuration error.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub geocoding: GeocodingConfig,
    pub scraper: ScraperConfig,
    pub metadata: MetadataConfig,
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Minimum spacing between outbound geocoding requests, system-wide.
    pub min_interval_ms: u64,
    pub endpoint: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1100,
            endpoint: crate::constants::NOMINATIM_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub navigation_timeout_secs: u64,
    /// Settle time after each "show more" click.
    pub settle_ms: u64,
    pub max_expand_rounds: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 20,
            settle_ms: 2000,
            max_expand_rounds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Post-call delay to respect the metadata provider's rate limits.
    pub delay_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { delay_ms: 250 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent item pipelines per batch; bounds simultaneous browser sessions.
    pub batch_size: usize,
    /// When true, ids already in the resume state are scraped again anyway.
    pub rescrape_processed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            rescrape_processed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub catalog: String,
    pub resume: String,
    pub cache_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: "data/catalog.json".to_string(),
            resume: "data/resume.json".to_string(),
            cache_dir: "cache".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        match fs::read_to_string(config_path) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            Err(_) => Ok(Config::default()),
        }
    }
}
