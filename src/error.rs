//! Error types and handling for `locmap`

use thiserror::Error;

/// Main error type for the `locmap` application
#[derive(Error, Debug)]
pub enum LocmapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Geocoding provider communication errors
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Uploaded table does not carry the columns its scenario needs
    #[error("Uploaded file is missing columns for {scenario}: {}", columns.join(", "))]
    MissingColumns {
        scenario: String,
        columns: Vec<String>,
    },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },
}

impl LocmapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a missing-columns error; columns are sorted for stable output
    pub fn missing_columns<S: Into<String>>(scenario: S, mut columns: Vec<String>) -> Self {
        columns.sort();
        Self::MissingColumns {
            scenario: scenario.into(),
            columns,
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            LocmapError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
            LocmapError::Api { .. } => {
                "Unable to reach the geocoding service. Please check your internet connection."
                    .to_string()
            }
            LocmapError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            LocmapError::MissingColumns { columns, .. } => {
                format!("Uploaded file is missing columns: {}", columns.join(", "))
            }
            LocmapError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
        }
    }
}
