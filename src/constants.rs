/// Shared constants: cache namespaces, provider endpoints, and the selector
/// tables the location-page extractor works through.

// Cache namespaces. One subdirectory per namespace under the cache root.
pub const NS_IDENTITY: &str = "identity";
pub const NS_METADATA: &str = "metadata";
pub const NS_LOCATIONS: &str = "locations";
pub const NS_GEOCODE: &str = "geocode";

// Metadata provider (TMDB)
pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const TMDB_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

// Geocoding provider (Nominatim). Usage policy requires an identifying UA.
pub const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const GEOCODE_USER_AGENT: &str = "setmap-scraper/0.1 (filming-location catalog)";

// Location listing page for a title id
pub fn locations_page_url(imdb_id: &str) -> String {
    format!("https://www.imdb.com/title/{imdb_id}/locations/")
}

/// Candidate selectors for the "show more" control, tried in order. The page
/// has shipped several variants of this button over time.
pub const EXPAND_SELECTORS: &[&str] = &[
    "[data-testid=\"filming-locations-btn-expand\"]",
    "button.ipc-see-more__button",
    "span.single-page-see-more-button button",
];

/// Navigation/boilerplate phrases the heuristic text extractor filters out.
pub const BOILERPLATE_PHRASES: &[&str] = &[
    "see more",
    "see all",
    "create a list",
    "sign in",
    "back to top",
    "recently viewed",
    "it looks like we don't have any",
    "contribute to this page",
    "edit page",
    "getting started",
];
