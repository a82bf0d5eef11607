use serde::{Deserialize, Serialize};

/// Movie vs. series, as the metadata provider distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
}

impl ContentType {
    /// Path segment used by the provider's detail endpoints.
    pub fn api_path(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "tv",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_path())
    }
}

/// The provider-internal handle an external id resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRef {
    pub tmdb_id: u64,
    pub content_type: ContentType,
}

/// Title metadata as fetched from the provider's detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleMetadata {
    pub title: String,
    /// Leading year of the release date; 0 when absent or malformed.
    pub year: i32,
    pub genres: Vec<String>,
    pub poster: Option<String>,
    /// YouTube key of the first video tagged as a trailer, if any.
    pub trailer: Option<String>,
    pub rating: Option<f64>,
}

/// One unprocessed filming-location mention scraped off the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLocation {
    pub place: String,
    pub scene: Option<String>,
}

/// A geocoded filming location as persisted in the catalog. Downstream
/// consumers rely on `lat`/`lng` always being numeric and on `city`/`country`
/// defaulting to "Unknown" rather than being absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub country: String,
    /// The original scraped mention, verbatim.
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_description: Option<String>,
}

/// One catalog entry: a movie or series with its enriched location list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Stable, provider-neutral identifier (the external id the run was fed).
    pub id: String,
    pub title: String,
    pub year: i32,
    pub imdb_id: String,
    pub tmdb_id: u64,
    pub content_type: ContentType,
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub locations: Vec<Location>,
}
