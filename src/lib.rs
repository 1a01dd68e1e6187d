//! `locmap` - Geocode location records and put them on a map
//!
//! This library resolves country/postal/city records to coordinates through
//! a fallback chain of geocoding queries, measures great-circle distances,
//! and turns uploaded tables into exports and Leaflet maps.

pub mod api;
pub mod config;
pub mod distance;
pub mod error;
pub mod geocoding;
pub mod location_resolver;
pub mod map;
pub mod models;
pub mod pipeline;
pub mod scenario;
pub mod table;
pub mod telemetry;
pub mod templates;
pub mod web;

// Re-export core types for public API
pub use config::LocmapConfig;
pub use distance::{DistanceRounding, distance_km};
pub use error::LocmapError;
pub use geocoding::{CachedGeocoder, Geocoder, NominatimClient, PersistentCache};
pub use location_resolver::LocationResolver;
pub use map::RenderContext;
pub use models::{DistanceResult, LocationQuery, ProcessedRecord, Resolution, ResolvedLocation};
pub use pipeline::{BatchOutput, BatchSummary, Pipeline};
pub use scenario::Scenario;
pub use table::Table;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, LocmapError>;
