//! Location Resolution Module
//!
//! Turns a [`LocationQuery`] into coordinates by walking a chain of
//! increasingly coarse candidate queries:
//!
//! 1. `"{city}, {postal}, {country}"` when both city and postal code are known
//! 2. `"{postal}, {country}"`
//! 3. `"{city}, {country}"`
//! 4. `"capital city of {country}"`
//!
//! A hit is only accepted when its address lies in the requested country,
//! either directly or after a reverse-geocoding recheck of its coordinates.
//! Provider errors on one candidate never abort the chain.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::geocoding::{GeocodeHit, Geocoder};
use crate::models::{LocationQuery, Resolution, ResolvedLocation};

/// One attempt in the fallback chain, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    CityPostal,
    Postal,
    City,
    Capital,
}

impl Candidate {
    /// Candidates applicable to a query, in the order they are tried
    #[must_use]
    pub fn chain(query: &LocationQuery) -> Vec<Candidate> {
        let mut chain = Vec::with_capacity(4);
        if query.city.is_some() && query.postal_code.is_some() {
            chain.push(Candidate::CityPostal);
        }
        if query.postal_code.is_some() {
            chain.push(Candidate::Postal);
        }
        if query.city.is_some() {
            chain.push(Candidate::City);
        }
        chain.push(Candidate::Capital);
        chain
    }

    /// Query string sent to the geocoder
    #[must_use]
    pub fn query_string(self, query: &LocationQuery) -> String {
        let country = &query.country_code;
        let postal = query.postal_code.as_deref().unwrap_or_default();
        let city = query.city.as_deref().unwrap_or_default();
        match self {
            Candidate::CityPostal => format!("{city}, {postal}, {country}"),
            Candidate::Postal => format!("{postal}, {country}"),
            Candidate::City => format!("{city}, {country}"),
            Candidate::Capital => format!("capital city of {country}"),
        }
    }

    fn carries_postal(self) -> bool {
        matches!(self, Candidate::CityPostal | Candidate::Postal)
    }

    fn carries_city(self) -> bool {
        matches!(self, Candidate::CityPostal | Candidate::City)
    }

    fn to_location(self, query: &LocationQuery, hit: &GeocodeHit) -> ResolvedLocation {
        ResolvedLocation {
            latitude: hit.latitude,
            longitude: hit.longitude,
            matched_postal_code: query.postal_code.clone().filter(|_| self.carries_postal()),
            matched_city: query.city.clone().filter(|_| self.carries_city()),
            country_code: query.country_code.clone(),
        }
    }
}

/// Outcome of a single candidate attempt
enum Attempt {
    Accepted(GeocodeHit),
    Rejected,
    Failed(String),
}

/// Service for resolving location queries through the fallback chain
#[derive(Clone)]
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    country_check: bool,
}

impl LocationResolver {
    /// Resolver validating result countries
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            geocoder,
            country_check: true,
        }
    }

    /// Toggle the country-match validation; without it the first hit wins
    #[must_use]
    pub fn with_country_check(mut self, enabled: bool) -> Self {
        self.country_check = enabled;
        self
    }

    /// Convenience wrapper building the query from raw fields.
    /// Invalid queries (no country code) resolve to absent.
    pub async fn resolve_fields(
        &self,
        country_code: &str,
        postal_code: Option<&str>,
        city: Option<&str>,
    ) -> Option<ResolvedLocation> {
        match LocationQuery::new(country_code, postal_code, city) {
            Ok(query) => self.resolve(&query).await.into_location(),
            Err(e) => {
                debug!("Skipping resolution: {}", e);
                None
            }
        }
    }

    /// Resolve a query, trying each candidate until one is accepted
    #[instrument(skip(self), fields(query = %query.describe()))]
    pub async fn resolve(&self, query: &LocationQuery) -> Resolution {
        let mut last_error = None;

        for candidate in Candidate::chain(query) {
            let text = candidate.query_string(query);
            debug!("Trying {:?} candidate '{}'", candidate, text);

            match self.attempt(&text, &query.country_code).await {
                Attempt::Accepted(hit) => {
                    let location = candidate.to_location(query, &hit);
                    info!(
                        "Resolved '{}' via {:?} at ({:.4}, {:.4})",
                        query.describe(),
                        candidate,
                        location.latitude,
                        location.longitude
                    );
                    return Resolution::Found(location);
                }
                Attempt::Rejected => {}
                Attempt::Failed(message) => {
                    warn!("Candidate '{}' failed: {}", text, message);
                    last_error = Some(message);
                }
            }
        }

        match last_error {
            Some(message) => {
                warn!("Could not resolve '{}': {}", query.describe(), message);
                Resolution::ServiceError { message }
            }
            None => {
                info!("No match for '{}'", query.describe());
                Resolution::NotFound
            }
        }
    }

    async fn attempt(&self, text: &str, country_code: &str) -> Attempt {
        let hit = match self.geocoder.geocode(text).await {
            Ok(Some(hit)) => hit,
            Ok(None) => return Attempt::Rejected,
            Err(e) => return Attempt::Failed(e.to_string()),
        };

        if !self.country_check || hit.address.matches_country(country_code) {
            return Attempt::Accepted(hit);
        }

        debug!(
            "Country mismatch for '{}': got {:?}, expected {}; rechecking by reverse lookup",
            text,
            hit.address.country_code(),
            country_code
        );

        match self
            .geocoder
            .reverse_geocode(hit.latitude, hit.longitude)
            .await
        {
            Ok(Some(address)) if address.matches_country(country_code) => {
                Attempt::Accepted(GeocodeHit { address, ..hit })
            }
            Ok(_) => Attempt::Rejected,
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }
}
