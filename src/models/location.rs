//! Location models: the query handed to the resolver and what comes back

use serde::{Deserialize, Serialize};

use crate::LocmapError;

/// Location description taken from one side of an input row
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct LocationQuery {
    /// Country code (ISO 3166-1 alpha-2), kept as supplied apart from trimming
    pub country_code: String,
    /// Postal code as text; leading zeros are significant
    pub postal_code: Option<String>,
    /// City or locality name
    pub city: Option<String>,
}

impl LocationQuery {
    /// Build a query, treating blank strings as absent.
    ///
    /// Fails when the country code is missing, since every candidate query
    /// needs it.
    pub fn new(
        country_code: &str,
        postal_code: Option<&str>,
        city: Option<&str>,
    ) -> crate::Result<Self> {
        let country_code = country_code.trim();
        if country_code.is_empty() {
            return Err(LocmapError::validation("Country code cannot be empty"));
        }

        Ok(Self {
            country_code: country_code.to_string(),
            postal_code: non_blank(postal_code),
            city: non_blank(city),
        })
    }

    /// Human readable form used in logs
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(city) = &self.city {
            parts.push(city.as_str());
        }
        if let Some(postal) = &self.postal_code {
            parts.push(postal.as_str());
        }
        parts.push(self.country_code.as_str());
        parts.join(", ")
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Successful resolution of a [`LocationQuery`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResolvedLocation {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Postal code of the candidate query that succeeded, if it carried one
    pub matched_postal_code: Option<String>,
    /// City of the candidate query that succeeded, if it carried one
    pub matched_city: Option<String>,
    /// Echo of the requested country code
    pub country_code: String,
}

impl ResolvedLocation {
    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// `[lat, lon]` pair as fed to the map
    #[must_use]
    pub fn lat_lon(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Distance between two optionally resolved endpoints
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DistanceResult {
    pub origin: Option<ResolvedLocation>,
    pub destination: Option<ResolvedLocation>,
    /// Absent exactly when either endpoint is absent
    pub distance_km: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_requires_country_code() {
        assert!(LocationQuery::new("", Some("10001"), Some("New York")).is_err());
        assert!(LocationQuery::new("   ", None, None).is_err());
    }

    #[test]
    fn test_query_normalises_blank_fields() {
        let query = LocationQuery::new(" US ", Some("  "), Some("")).unwrap();
        assert_eq!(query.country_code, "US");
        assert_eq!(query.postal_code, None);
        assert_eq!(query.city, None);
    }

    #[test]
    fn test_query_keeps_leading_zeros() {
        let query = LocationQuery::new("DE", Some("01067"), Some("Dresden")).unwrap();
        assert_eq!(query.postal_code.as_deref(), Some("01067"));
        assert_eq!(query.describe(), "Dresden, 01067, DE");
    }

    #[test]
    fn test_format_coordinates() {
        let location = ResolvedLocation {
            latitude: 40.750_61,
            longitude: -73.997_12,
            matched_postal_code: None,
            matched_city: None,
            country_code: "US".to_string(),
        };
        assert_eq!(location.format_coordinates(), "40.7506, -73.9971");
        assert_eq!(location.lat_lon(), [40.750_61, -73.997_12]);
    }
}
