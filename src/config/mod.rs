//! Configuration management for the offline core

pub mod schema;

pub use schema::Config;

use crate::error::{OfflineError, OfflineResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("leoiptv")
            .join("offline.toml")
    }

    /// Default root of the persistent cache store
    pub fn default_store_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("leoiptv")
            .join("caches")
    }

    /// Store root from config, falling back to the default
    pub fn store_dir(config: &Config) -> PathBuf {
        config
            .cache
            .store_dir
            .clone()
            .unwrap_or_else(Self::default_store_dir)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> OfflineResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file and validate it
    pub async fn load_from_file(&self, path: &Path) -> OfflineResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| OfflineError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| OfflineError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate().map_err(|e| OfflineError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration, failing if the file does not exist
    pub async fn load_required(&self) -> OfflineResult<Config> {
        if !self.config_path.exists() {
            return Err(OfflineError::ConfigNotFound(self.config_path.clone()));
        }
        self.load_from_file(&self.config_path).await
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> OfflineResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            OfflineError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> OfflineResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OfflineError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
