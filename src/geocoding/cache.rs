use anyhow::Result;
use async_trait::async_trait;
use fjall::Keyspace;
use rand::RngExt;
use serde::Deserialize;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task;
use tracing::warn;

use super::{Address, GeocodeHit, Geocoder};
use crate::LocmapError;

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at: u64, // Unix timestamp (seconds)
}

pub struct PersistentCache {
    store: Keyspace,
}

fn cache_error(err: impl std::fmt::Display) -> LocmapError {
    LocmapError::cache(err.to_string())
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> crate::Result<Option<Vec<u8>>> {
    Ok(store.get(key).map_err(cache_error)?.map(|v| v.to_vec()))
}

impl PersistentCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("geocode", fjall::KeyspaceCreateOptions::default)?;
        Ok(PersistentCache { store: items })
    }

    /// Stores a serializable value with a time-to-live (TTL).
    #[tracing::instrument(name = "put_cache", level = "debug", skip(self, value))]
    pub async fn put<T: Serialize + Send + Debug + 'static>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> crate::Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or_else(|| LocmapError::cache("TTL overflow"))?
            .duration_since(UNIX_EPOCH)
            .map_err(cache_error)?
            .as_secs();
        let entry = StoredEntry { value, expires_at };
        let bytes = postcard::to_stdvec(&entry).map_err(cache_error)?;

        task::spawn_blocking(move || store.insert(key, bytes))
            .await
            .map_err(cache_error)?
            .map_err(cache_error)?;
        Ok(())
    }

    /// Retrieves a value if it exists and has not expired.
    /// Returns `None` for cache misses or expired entries, and
    /// [`LocmapError::Cache`] for entries that cannot be decoded.
    #[tracing::instrument(name = "query_cache", level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned + Send + 'static>(
        &self,
        key: &str,
    ) -> crate::Result<Option<T>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes: Option<Vec<u8>> =
            task::spawn_blocking(move || get_from_store(store, key_bytes))
                .await
                .map_err(cache_error)??;

        if let Some(bytes) = maybe_bytes {
            let entry: StoredEntry<T> = postcard::from_bytes(&bytes).map_err(cache_error)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(cache_error)?
                .as_secs();

            if now < entry.expires_at {
                tracing::debug!("Key found and still fresh");
                Ok(Some(entry.value))
            } else {
                tracing::debug!("Key found but expired");
                self.remove(key).await?;
                Ok(None)
            }
        } else {
            tracing::debug!("Key not found");
            Ok(None)
        }
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) -> crate::Result<()> {
        let key = key.as_bytes().to_vec();
        let store = self.store.clone();
        task::spawn_blocking(move || store.remove(key))
            .await
            .map_err(cache_error)?
            .map_err(cache_error)?;
        Ok(())
    }
}

/// Memoizes another geocoder's answers, including confirmed misses.
///
/// Provider errors are never cached. Cache failures are logged and the
/// inner geocoder is asked instead.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: PersistentCache,
    ttl: Duration,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, cache: PersistentCache, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    async fn lookup<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Option<T> {
        match self.cache.get::<T>(key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn store<T: Serialize + Send + Debug + 'static>(&self, key: &str, value: T) {
        // spread expiry so entries written in one batch do not all lapse together
        let jitter: f64 = rand::rng().random_range(0.9..1.1);
        let ttl = self.ttl.mul_f64(jitter);
        if let Err(e) = self.cache.put(key, value, ttl).await {
            warn!("Failed to cache {}: {}", key, e);
        }
    }
}

fn geocode_key(query: &str) -> String {
    format!("geocode:{}", query.trim().to_lowercase())
}

fn reverse_key(latitude: f64, longitude: f64) -> String {
    format!("reverse:{latitude:.6}:{longitude:.6}")
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>> {
        let key = geocode_key(query);
        if let Some(cached) = self.lookup::<Option<GeocodeHit>>(&key).await {
            return Ok(cached);
        }

        let hit = self.inner.geocode(query).await?;
        self.store(&key, hit.clone()).await;
        Ok(hit)
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> crate::Result<Option<Address>> {
        let key = reverse_key(latitude, longitude);
        if let Some(cached) = self.lookup::<Option<Address>>(&key).await {
            return Ok(cached);
        }

        let address = self.inner.reverse_geocode(latitude, longitude).await?;
        self.store(&key, address.clone()).await;
        Ok(address)
    }
}
