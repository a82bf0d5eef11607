use crate::types::Location;
use std::collections::HashSet;

/// Collapses near-duplicate locations within one record: coordinates rounded
/// to 4 decimal places (~11 m) share a key, and only the first occurrence
/// per key survives, in original order.
pub fn dedupe_locations(locations: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|location| seen.insert(coordinate_key(location.lat, location.lng)))
        .collect()
}

fn coordinate_key(lat: f64, lng: f64) -> String {
    format!("{lat:.4},{lng:.4}")
}
