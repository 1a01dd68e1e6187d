//! Data models for locmap
//!
//! - Location: queries, resolved coordinates and distance results
//! - Record: input rows and their resolution results

pub mod location;
pub mod record;

pub use location::{DistanceResult, LocationQuery, ResolvedLocation};
pub use record::{ProcessedRecord, Resolution, RowResult};
