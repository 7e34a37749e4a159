//! Error types for the offline core
//!
//! All modules use `OfflineResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for offline core operations
pub type OfflineResult<T> = Result<T, OfflineError>;

/// All errors that can occur in the offline core
#[derive(Error, Debug)]
pub enum OfflineError {
    // Cache lifecycle errors
    #[error("Precache failed for {url}: {reason}")]
    PrecacheFailure { url: String, reason: String },

    #[error("Failed to write {key} into cache {generation}: {reason}")]
    CacheWrite {
        generation: String,
        key: String,
        reason: String,
    },

    #[error("Failed to delete stale cache {generation}: {reason}")]
    Cleanup { generation: String, reason: String },

    #[error("Cache generation not found: {0}")]
    GenerationNotFound(String),

    // Request errors
    #[error("Network request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Background task '{tag}' failed: {reason}")]
    BackgroundTask { tag: String, reason: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid precache manifest: {0}")]
    ManifestInvalid(String),

    #[error("Worker is {state}, cannot {action}")]
    InvalidState { state: String, action: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OfflineError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a later attempt may succeed without any change on our side
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::BackgroundTask { .. } | Self::PrecacheFailure { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PrecacheFailure { .. } => {
                Some("Check that every precache path is served by the origin")
            }
            Self::ManifestInvalid(_) => {
                Some("Precache paths must be same-origin and include the fallback document")
            }
            Self::ConfigInvalid { .. } | Self::InvalidSetting { .. } => {
                Some("Fix the offending key in offline.toml")
            }
            _ => None,
        }
    }
}
