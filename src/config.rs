//! Configuration management for `locmap`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::LocmapError;
use crate::distance::DistanceRounding;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for `locmap`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocmapConfig {
    /// Geocoding provider configuration
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    /// Geocoding response cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Map rendering defaults
    #[serde(default)]
    pub map: MapConfig,
    /// Distance calculation settings
    #[serde(default)]
    pub distance: DistanceConfig,
    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,
}

/// Geocoding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Base URL of the Nominatim-compatible service
    #[serde(default = "default_geocoder_base_url")]
    pub base_url: String,
    /// User agent sent with every request (required by Nominatim's usage policy)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds
    #[serde(default = "default_geocoder_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_geocoder_max_retries")]
    pub max_retries: u32,
    /// Minimum delay between two outbound requests, in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Reject results whose address country differs from the requested one
    #[serde(default = "default_country_check")]
    pub country_check: bool,
}

/// Geocoding response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memoize geocoding responses on disk
    #[serde(default)]
    pub enabled: bool,
    /// Cache TTL in hours
    #[serde(default = "default_cache_ttl")]
    pub ttl_hours: u32,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Map rendering defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Marker radius in pixels
    #[serde(default = "default_dot_size")]
    pub dot_size: u32,
}

/// Distance calculation settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DistanceConfig {
    /// Rounding applied to computed distances
    #[serde(default)]
    pub rounding: DistanceRounding,
}

/// Web server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Port to listen on
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Maximum accepted upload size in MB
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u32,
}

// Default value functions
fn default_geocoder_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    format!("locmap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_geocoder_timeout() -> u32 {
    30
}

fn default_geocoder_max_retries() -> u32 {
    3
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_country_check() -> bool {
    true
}

fn default_cache_ttl() -> u32 {
    168
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("locmap").to_string_lossy().into_owned())
        .unwrap_or_else(|| ".locmap-cache".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_dot_size() -> u32 {
    2
}

fn default_web_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> u32 {
    20
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoder_base_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_geocoder_timeout(),
            max_retries: default_geocoder_max_retries(),
            min_interval_ms: default_min_interval_ms(),
            country_check: default_country_check(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_hours: default_cache_ttl(),
            location: default_cache_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            dot_size: default_dot_size(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl LocmapConfig {
    /// Load configuration from `config_path` (or the default location) and
    /// `LOCMAP__*` environment variables
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // LOCMAP__GEOCODER__MIN_INTERVAL_MS=2000 style overrides
        builder = builder.add_source(
            Environment::with_prefix("LOCMAP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: LocmapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("locmap").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.geocoder.base_url.is_empty() {
            self.geocoder.base_url = default_geocoder_base_url();
        }
        if self.geocoder.user_agent.is_empty() {
            self.geocoder.user_agent = default_user_agent();
        }
        if self.geocoder.timeout_seconds == 0 {
            self.geocoder.timeout_seconds = default_geocoder_timeout();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.map.dot_size == 0 {
            self.map.dot_size = default_dot_size();
        }
        if self.web.max_upload_mb == 0 {
            self.web.max_upload_mb = default_max_upload_mb();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.geocoder.timeout_seconds > 300 {
            return Err(
                LocmapError::config("Geocoder timeout cannot exceed 300 seconds").into(),
            );
        }

        if self.geocoder.max_retries > 10 {
            return Err(LocmapError::config("Geocoder max retries cannot exceed 10").into());
        }

        if self.cache.ttl_hours > 8760 {
            return Err(LocmapError::config("Cache TTL cannot exceed 8760 hours (1 year)").into());
        }

        if self.map.dot_size > 50 {
            return Err(LocmapError::config("Dot size cannot exceed 50 pixels").into());
        }

        if self.web.max_upload_mb > 200 {
            return Err(LocmapError::config("Upload limit cannot exceed 200 MB").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(LocmapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(LocmapError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.geocoder.base_url.starts_with("http://")
            && !self.geocoder.base_url.starts_with("https://")
        {
            return Err(LocmapError::config(
                "Geocoder base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        Ok(())
    }
}
