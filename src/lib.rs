pub mod cache;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod dedupe;
pub mod error;
pub mod geocode;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod scrape;
pub mod types;
