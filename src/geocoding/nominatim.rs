//! Nominatim (OpenStreetMap) geocoding client
//!
//! Requests go through a shared [`RateLimiter`] and a retrying HTTP client;
//! every answer is reduced to the [`GeocodeHit`]/[`Address`] shape the
//! resolver works with.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{Address, GeocodeHit, Geocoder, RateLimiter};
use crate::LocmapError;
use crate::config::GeocoderConfig;

/// Geocoding client for a Nominatim-compatible API
pub struct NominatimClient {
    client: ClientWithMiddleware,
    base_url: String,
    rate_limiter: RateLimiter,
}

/// One entry of a `/search?format=jsonv2` response
#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: BTreeMap<String, Value>,
}

/// `/reverse?format=jsonv2` response; misses come back as `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct ReverseResult {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    address: Option<BTreeMap<String, Value>>,
}

fn to_address(raw: BTreeMap<String, Value>) -> Address {
    raw.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            _ => None,
        })
        .collect()
}

fn parse_coordinate(value: &str, what: &str) -> crate::Result<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        LocmapError::api(format!(
            "Malformed {what} '{value}' in geocoding response"
        ))
    })
}

impl NominatimClient {
    /// Create a new client from the geocoder settings
    pub fn new(config: &GeocoderConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.into());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
        })
    }

    /// Make a rate limited GET request and decode the JSON body
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> crate::Result<T> {
        self.rate_limiter.acquire().await;

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LocmapError::api(format!("Geocoding request failed: {e}")))?;

        let status = response.status();
        debug!(
            "HTTP response received: {} in {:.3}s",
            status,
            start.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            warn!("Geocoding service answered with HTTP {}", status);
            return Err(LocmapError::api(format!(
                "Geocoding request failed with status: {} - {}",
                status,
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LocmapError::api(format!("Invalid geocoding response: {e}")))
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    #[instrument(skip(self))]
    async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>> {
        let url = format!(
            "{}/search?q={}&format=jsonv2&addressdetails=1&limit=1",
            self.base_url,
            urlencoding::encode(query)
        );

        let results: Vec<SearchResult> = self.get_json(&url).await?;
        let Some(best) = results.into_iter().next() else {
            debug!("No geocoding results for '{}'", query);
            return Ok(None);
        };

        let hit = GeocodeHit {
            latitude: parse_coordinate(&best.lat, "latitude")?,
            longitude: parse_coordinate(&best.lon, "longitude")?,
            address: to_address(best.address),
        };
        info!(
            "Geocoded '{}' to {} ({:.4}, {:.4})",
            query, best.display_name, hit.latitude, hit.longitude
        );
        Ok(Some(hit))
    }

    #[instrument(skip(self))]
    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> crate::Result<Option<Address>> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=jsonv2&addressdetails=1",
            self.base_url, latitude, longitude
        );

        let result: ReverseResult = self.get_json(&url).await?;
        if let Some(error) = result.error {
            debug!("Reverse geocoding miss: {}", error);
            return Ok(None);
        }
        Ok(result.address.map(to_address))
    }
}
