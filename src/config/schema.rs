//! Configuration schema for the offline core
//!
//! Configuration is stored at `~/.config/leoiptv/offline.toml`

use crate::cache::{GenerationSet, PrecacheManifest};
use crate::error::{OfflineError, OfflineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Logo shipped with the application shell
pub const DEFAULT_ICON: &str = "/golden-lion-with-crown-logo-vector-45981373.png";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Application identity
    pub app: AppConfig,

    /// Cache generations and precache list
    pub cache: CacheConfig,

    /// Network transport settings
    pub transport: TransportConfig,

    /// Background sync settings
    pub sync: SyncConfig,

    /// Push notification settings
    pub notifications: NotificationConfig,
}

impl Config {
    /// Parsed application origin
    pub fn origin(&self) -> OfflineResult<Url> {
        let url = Url::parse(&self.app.origin)
            .map_err(|e| OfflineError::invalid_url(&self.app.origin, e))?;
        if url.cannot_be_a_base() {
            return Err(OfflineError::invalid_url(
                &self.app.origin,
                "origin must be an absolute http(s) URL",
            ));
        }
        Ok(url)
    }

    /// Current static and dynamic generation names
    pub fn generations(&self) -> GenerationSet {
        GenerationSet::new(&self.cache.prefix, &self.cache.version)
    }

    /// Precache manifest resolved against the origin
    pub fn manifest(&self) -> OfflineResult<PrecacheManifest> {
        PrecacheManifest::new(
            &self.origin()?,
            &self.cache.precache,
            &self.cache.fallback_document,
        )
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> OfflineResult<()> {
        self.manifest()?;

        let required = [
            ("cache.prefix", &self.cache.prefix),
            ("cache.version", &self.cache.version),
            ("sync.playlist_tag", &self.sync.playlist_tag),
        ];
        for (key, value) in required {
            if value.is_empty() {
                return Err(OfflineError::InvalidSetting {
                    key: key.to_string(),
                    reason: "must be non-empty".to_string(),
                });
            }
        }
        for url in &self.sync.playlist_urls {
            Url::parse(url).map_err(|e| OfflineError::invalid_url(url, e))?;
        }
        Ok(())
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Display name used as notification title
    pub name: String,

    /// Origin the application is served from
    pub origin: String,

    /// Page opened from a notification
    pub start_url: String,

    /// Icon and badge for notifications
    pub icon: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "LEOIPTV".to_string(),
            origin: "http://localhost:4173".to_string(),
            start_url: "/".to_string(),
            icon: DEFAULT_ICON.to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Generation name prefix
    pub prefix: String,

    /// Deployment version; bump to invalidate every cached entry
    pub version: String,

    /// Assets fetched at install time, in order
    pub precache: Vec<String>,

    /// Document served for failed navigations (must be precached)
    pub fallback_document: String,

    /// Root directory of the persistent store
    pub store_dir: Option<PathBuf>,

    /// Quota used for usage reporting (no eviction)
    pub quota_mb: Option<u32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "leoiptv".to_string(),
            version: "v1".to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                DEFAULT_ICON.to_string(),
            ],
            fallback_document: "/index.html".to_string(),
            store_dir: None,
            quota_mb: None,
        }
    }
}

/// Network transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Overall per-request timeout; unset leaves it to the OS
    pub timeout_secs: Option<u64>,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(30),
            user_agent: concat!("leoiptv-offline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Background sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tag of the playlist refresh task
    pub playlist_tag: String,

    /// Playlist URLs refreshed by the background task
    pub playlist_urls: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            playlist_tag: "playlist-update".to_string(),
            playlist_urls: vec![],
        }
    }
}

/// Push notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Body used when a push carries no text
    pub default_body: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,

    /// Title of the "open application" action
    pub open_title: String,

    /// Title of the "dismiss" action
    pub close_title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_body: "New content available".to_string(),
            vibrate: vec![200, 100, 200],
            open_title: "Open LEOIPTV".to_string(),
            close_title: "Close".to_string(),
        }
    }
}
