pub mod queue;

pub use queue::GeocodeQueue;

use crate::cache::Cache;
use crate::constants::{GEOCODE_USER_AGENT, NS_GEOCODE};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Raw hit from the geocoding service, before address mapping.
#[derive(Debug, Clone)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lng: f64,
    pub address: AddressFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressFields {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Mapped geocode result, cached per cascade query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub country: String,
}

/// The outbound geocoding call, behind a seam so tests can stub the service.
#[async_trait]
pub trait GeocodeBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<GeocodeHit>>;
}

/// Free-text search against a Nominatim-compatible endpoint: one result,
/// address details requested.
pub struct NominatimBackend {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    address: AddressFields,
}

impl NominatimBackend {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GeocodeBackend for NominatimBackend {
    async fn search(&self, query: &str) -> Result<Option<GeocodeHit>> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, GEOCODE_USER_AGENT)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        // The service returns coordinates as strings; an unparseable pair is
        // as good as no hit.
        match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
            (Ok(lat), Ok(lng)) => Ok(Some(GeocodeHit {
                lat,
                lng,
                address: place.address,
            })),
            _ => Ok(None),
        }
    }
}

/// Builds the ordered fallback queries for one raw place mention. The first
/// entry is always the mention verbatim; the rest progressively strip the
/// most specific segments (venue names, building numbers) until something
/// the geocoder recognizes remains. Deduplicated, order preserved.
pub fn build_query_cascade(mention: &str) -> Vec<String> {
    let segments: Vec<&str> = mention
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let n = segments.len();

    let mut queries: Vec<String> = vec![mention.to_string()];
    if n >= 3 {
        // Drop the leading venue/building segment
        queries.push(segments[1..].join(", "));
    }
    if n >= 2 {
        // First segment + last segment: a "city + country" guess
        queries.push(format!("{}, {}", segments[0], segments[n - 1]));
    }
    if n >= 4 {
        queries.push(segments[n - 3..].join(", "));
    }
    if n >= 3 {
        queries.push(segments[n - 2..].join(", "));
    }
    if n >= 2 {
        queries.push(segments[0].to_string());
    }
    if n >= 3 {
        queries.push(segments[1].to_string());
    }

    let mut seen = HashSet::new();
    queries.retain(|q| seen.insert(q.clone()));
    queries
}

/// Cache key for a cascade query: case- and whitespace-insensitive.
fn normalize_query(query: &str) -> String {
    query.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Maps a raw hit into the persisted shape. City falls through
/// city → town → village → county → state and finally the mention's own
/// first segment; country is taken directly, "Unknown" when absent.
fn place_from_hit(hit: &GeocodeHit, fallback_city: &str) -> GeocodedPlace {
    let address = &hit.address;
    let city = address
        .city
        .clone()
        .or_else(|| address.town.clone())
        .or_else(|| address.village.clone())
        .or_else(|| address.county.clone())
        .or_else(|| address.state.clone())
        .unwrap_or_else(|| fallback_city.to_string());
    let country = address.country.clone().unwrap_or_else(|| "Unknown".to_string());
    GeocodedPlace {
        lat: hit.lat,
        lng: hit.lng,
        city,
        country,
    }
}

/// Converts one raw place mention into coordinates via the query cascade.
/// Every live request is funneled through the shared queue; every mapped
/// result is cached under the query that produced it.
pub struct GeocodingResolver {
    backend: Arc<dyn GeocodeBackend>,
    cache: Cache,
    queue: Arc<GeocodeQueue>,
}

impl GeocodingResolver {
    pub fn new(backend: Arc<dyn GeocodeBackend>, cache: Cache, queue: Arc<GeocodeQueue>) -> Self {
        Self {
            backend,
            cache,
            queue,
        }
    }

    /// Resolve a mention, or `None` when the whole cascade comes up empty.
    /// Transient request failures soft-fail the query they hit and the
    /// cascade moves on.
    #[instrument(skip(self))]
    pub async fn resolve(&self, mention: &str) -> Option<GeocodedPlace> {
        let fallback_city = mention
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or(mention)
            .to_string();

        for query in build_query_cascade(mention) {
            let cache_key = normalize_query(&query);
            if let Some(hit) = self.cache.get_as::<GeocodedPlace>(NS_GEOCODE, &cache_key) {
                return Some(hit);
            }

            let backend = Arc::clone(&self.backend);
            let live_query = query.clone();
            let outcome = self
                .queue
                .enqueue(async move { backend.search(&live_query).await })
                .await;

            match outcome {
                Ok(Some(hit)) => {
                    let place = place_from_hit(&hit, &fallback_city);
                    self.cache.put(NS_GEOCODE, &cache_key, &place);
                    return Some(place);
                }
                Ok(None) => {
                    debug!("no geocode result for query '{}'", query);
                }
                Err(e) => {
                    warn!("geocode request failed for query '{}': {}", query, e);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_head_is_verbatim_input() {
        for input in ["Tower Bridge, London, England, UK", "Paris", "  a , b "] {
            let cascade = build_query_cascade(input);
            assert_eq!(cascade[0], input);
        }
    }

    #[test]
    fn test_cascade_has_no_duplicates_and_no_wider_tails() {
        let input = "Stage 4, Warner Bros. Studios, Burbank, California, USA";
        let cascade = build_query_cascade(input);

        let mut seen = HashSet::new();
        for query in &cascade {
            assert!(seen.insert(query.clone()), "duplicate entry: {query}");
        }

        let input_segments = input.split(',').count();
        for query in cascade.iter().skip(1) {
            assert!(
                query.split(',').count() <= input_segments,
                "'{query}' has more segments than the input"
            );
        }
    }

    #[test]
    fn test_tower_bridge_cascade_scenario() {
        let cascade = build_query_cascade("Tower Bridge, London, England, UK");
        assert_eq!(
            cascade,
            vec![
                "Tower Bridge, London, England, UK",
                "London, England, UK",
                "Tower Bridge, UK",
                "England, UK",
                "Tower Bridge",
                "London",
            ]
        );
    }

    #[test]
    fn test_single_segment_cascade_is_just_the_input() {
        assert_eq!(build_query_cascade("Reykjavik"), vec!["Reykjavik"]);
    }

    #[test]
    fn test_two_segment_cascade() {
        assert_eq!(
            build_query_cascade("Tower Bridge, London"),
            vec!["Tower Bridge, London", "Tower Bridge"]
        );
    }

    #[test]
    fn test_normalize_query_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_query("  Tower   Bridge,  LONDON "),
            "tower bridge, london"
        );
    }

    #[test]
    fn test_city_precedence_and_fallbacks() {
        let hit = GeocodeHit {
            lat: 51.5,
            lng: -0.12,
            address: AddressFields {
                town: Some("Hobbiton".to_string()),
                state: Some("Waikato".to_string()),
                country: Some("New Zealand".to_string()),
                ..Default::default()
            },
        };
        let place = place_from_hit(&hit, "Matamata");
        assert_eq!(place.city, "Hobbiton");
        assert_eq!(place.country, "New Zealand");

        let bare = GeocodeHit {
            lat: 0.0,
            lng: 0.0,
            address: AddressFields::default(),
        };
        let place = place_from_hit(&bare, "Matamata");
        assert_eq!(place.city, "Matamata");
        assert_eq!(place.country, "Unknown");
    }
}
