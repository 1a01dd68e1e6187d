//! Geocoding capability consumed by the location resolver
//!
//! The [`Geocoder`] trait is the seam between the resolver and whatever
//! answers place queries. [`NominatimClient`] talks to an OpenStreetMap
//! Nominatim instance, [`CachedGeocoder`] memoizes any geocoder on disk.

pub mod cache;
pub mod nominatim;
pub mod rate_limit;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::{CachedGeocoder, PersistentCache};
pub use nominatim::NominatimClient;
pub use rate_limit::RateLimiter;

/// Address components returned by the provider, e.g. `country_code`, `city`, `postcode`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Address {
    pub fields: BTreeMap<String, String>,
}

impl Address {
    /// Country code of the address, lower-cased
    #[must_use]
    pub fn country_code(&self) -> Option<String> {
        self.fields
            .get("country_code")
            .map(|code| code.trim().to_ascii_lowercase())
            .filter(|code| !code.is_empty())
    }

    /// Case-insensitive comparison against a requested country code
    #[must_use]
    pub fn matches_country(&self, country_code: &str) -> bool {
        self.country_code()
            .is_some_and(|code| code.eq_ignore_ascii_case(country_code.trim()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Address {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A forward geocoding match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Address,
}

/// Forward and reverse geocoding.
///
/// `Ok(None)` means the provider answered without a match; `Err` means the
/// provider could not be asked or its answer was unusable.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>>;

    async fn reverse_geocode(&self, latitude: f64, longitude: f64)
    -> crate::Result<Option<Address>>;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>> {
        (**self).geocode(query).await
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> crate::Result<Option<Address>> {
        (**self).reverse_geocode(latitude, longitude).await
    }
}
