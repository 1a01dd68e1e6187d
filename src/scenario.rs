//! Input scenarios and their required columns

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LocmapError;

/// Which kind of table the operator uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Standard,
    SupplyChain,
    Distance,
    Volume,
}

/// Column triple describing one location inside a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationColumns {
    pub country_code: &'static str,
    pub postal_code: &'static str,
    pub city: &'static str,
}

pub const PLAIN: LocationColumns = LocationColumns {
    country_code: "country_code",
    postal_code: "postal_code",
    city: "city",
};

pub const WAREHOUSE: LocationColumns = LocationColumns {
    country_code: "country_code_warehouse",
    postal_code: "postal_code_warehouse",
    city: "city_warehouse",
};

pub const ORIGIN: LocationColumns = LocationColumns {
    country_code: "country_code_orig",
    postal_code: "postal_code_orig",
    city: "city_orig",
};

pub const DESTINATION: LocationColumns = LocationColumns {
    country_code: "country_code_dest",
    postal_code: "postal_code_dest",
    city: "city_dest",
};

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Standard,
        Scenario::SupplyChain,
        Scenario::Distance,
        Scenario::Volume,
    ];

    /// Short identifier used on the command line and in forms
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Scenario::Standard => "standard",
            Scenario::SupplyChain => "supply-chain",
            Scenario::Distance => "distance",
            Scenario::Volume => "volume",
        }
    }

    /// Name shown to the operator
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Scenario::Standard => "Standard visualization",
            Scenario::SupplyChain => "Supply-chain visualization",
            Scenario::Distance => "Distance calculation",
            Scenario::Volume => "Volume visualization",
        }
    }

    /// Location column groups, in resolution order
    #[must_use]
    pub fn locations(self) -> &'static [LocationColumns] {
        match self {
            Scenario::Standard | Scenario::Volume => &[PLAIN],
            Scenario::SupplyChain => &[DESTINATION, WAREHOUSE],
            Scenario::Distance => &[ORIGIN, DESTINATION],
        }
    }

    /// Column holding the marker category, if the scenario has one
    #[must_use]
    pub fn category_column(self) -> Option<&'static str> {
        match self {
            Scenario::Standard | Scenario::SupplyChain => Some("layer"),
            Scenario::Volume => Some("volume"),
            Scenario::Distance => None,
        }
    }

    /// Every column the uploaded table must carry
    #[must_use]
    pub fn required_columns(self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self
            .locations()
            .iter()
            .flat_map(|c| [c.country_code, c.postal_code, c.city])
            .collect();
        columns.extend(self.category_column());
        columns
    }

    /// Columns appended to the export
    #[must_use]
    pub fn result_columns(self) -> &'static [&'static str] {
        match self {
            Scenario::Standard | Scenario::Volume => &["latitude", "longitude"],
            Scenario::SupplyChain => &["latitude", "longitude", "warehouse_lat", "warehouse_lon"],
            Scenario::Distance => &[
                "orig_latitude",
                "orig_longitude",
                "dest_latitude",
                "dest_longitude",
                "distance_km",
            ],
        }
    }

    /// Check that `headers` cover the required columns
    pub fn validate_columns<S: AsRef<str>>(self, headers: &[S]) -> crate::Result<()> {
        let present: HashSet<&str> = headers.iter().map(|h| h.as_ref().trim()).collect();
        let missing: Vec<String> = self
            .required_columns()
            .into_iter()
            .filter(|column| !present.contains(column))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LocmapError::missing_columns(self.display_name(), missing))
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Scenario {
    type Err = LocmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Scenario::ALL
            .into_iter()
            .find(|scenario| {
                scenario.slug().eq_ignore_ascii_case(wanted)
                    || scenario.display_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                LocmapError::validation(format!(
                    "Unknown scenario '{wanted}'. Expected one of: {}",
                    Scenario::ALL.map(Scenario::slug).join(", ")
                ))
            })
    }
}
