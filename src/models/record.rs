//! Input rows augmented with resolution results

use serde::{Deserialize, Serialize};

use super::ResolvedLocation;

/// Outcome of resolving one [`super::LocationQuery`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Found(ResolvedLocation),
    /// Every candidate was answered, none produced a usable match
    NotFound,
    /// No candidate matched and at least one failed with a provider error
    ServiceError { message: String },
}

impl Resolution {
    /// Collapse to the plain `location | absent` view
    #[must_use]
    pub fn location(&self) -> Option<&ResolvedLocation> {
        match self {
            Resolution::Found(location) => Some(location),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_location(self) -> Option<ResolvedLocation> {
        match self {
            Resolution::Found(location) => Some(location),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    #[must_use]
    pub fn is_service_error(&self) -> bool {
        matches!(self, Resolution::ServiceError { .. })
    }
}

/// Per-scenario result attached to a row
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowResult {
    /// Standard and volume scenarios
    Single { location: Resolution },
    SupplyChain {
        warehouse: Resolution,
        destination: Resolution,
    },
    Distance {
        origin: Resolution,
        destination: Resolution,
        distance_km: Option<f64>,
    },
}

impl RowResult {
    /// All resolutions carried by the row, in export order
    #[must_use]
    pub fn resolutions(&self) -> Vec<&Resolution> {
        match self {
            RowResult::Single { location } => vec![location],
            RowResult::SupplyChain {
                warehouse,
                destination,
            } => vec![destination, warehouse],
            RowResult::Distance {
                origin,
                destination,
                ..
            } => vec![origin, destination],
        }
    }
}

/// One input row plus what the pipeline found for it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessedRecord {
    /// Zero-based row index in the input table
    pub index: usize,
    /// Original cells, aligned with the table headers
    pub cells: Vec<String>,
    /// Raw `layer` (or `volume`) value used for marker styling
    pub category: Option<String>,
    pub result: RowResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found() -> Resolution {
        Resolution::Found(ResolvedLocation {
            latitude: 48.8566,
            longitude: 2.3522,
            matched_postal_code: None,
            matched_city: None,
            country_code: "FR".to_string(),
        })
    }

    #[test]
    fn test_resolution_views() {
        assert!(found().is_found());
        assert_eq!(found().location().map(|l| l.latitude), Some(48.8566));
        assert!(Resolution::NotFound.location().is_none());

        let degraded = Resolution::ServiceError {
            message: "timeout".to_string(),
        };
        assert!(degraded.is_service_error());
        assert!(degraded.into_location().is_none());
    }

    #[test]
    fn test_supply_chain_export_order() {
        let result = RowResult::SupplyChain {
            warehouse: Resolution::NotFound,
            destination: found(),
        };
        let resolutions = result.resolutions();
        assert!(resolutions[0].is_found());
        assert!(!resolutions[1].is_found());
    }

    #[test]
    fn test_resolution_serializes_with_status_tag() {
        let json = serde_json::to_value(Resolution::NotFound).unwrap();
        assert_eq!(json["status"], "not_found");
    }
}
