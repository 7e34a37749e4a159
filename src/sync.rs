//! Background playlist refresh
//!
//! Runs when the host scheduler fires a sync task, at a time the application
//! does not control. The refresh re-fetches playlist metadata and writes it
//! into the dynamic generation, where the UI picks it up on its next
//! foreground read. Failures go back to the scheduler, which owns retry and
//! backoff.

use crate::cache::GenerationSet;
use crate::error::{OfflineError, OfflineResult};
use crate::http::{CacheKey, Request};
use crate::store::CacheStore;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Supplies the playlists to refresh
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn playlist_urls(&self) -> OfflineResult<Vec<Url>>;
}

/// Fixed list of playlist URLs from configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigPlaylistSource {
    urls: Vec<Url>,
}

impl ConfigPlaylistSource {
    pub fn new(urls: Vec<Url>) -> Self {
        Self { urls }
    }

    /// Parse configured URL strings
    pub fn from_strings(urls: &[String]) -> OfflineResult<Self> {
        let urls = urls
            .iter()
            .map(|u| Url::parse(u).map_err(|e| OfflineError::invalid_url(u, e)))
            .collect::<OfflineResult<Vec<_>>>()?;
        Ok(Self { urls })
    }
}

#[async_trait]
impl PlaylistSource for ConfigPlaylistSource {
    async fn playlist_urls(&self) -> OfflineResult<Vec<Url>> {
        Ok(self.urls.clone())
    }
}

/// Result of a sync invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Playlists refreshed; `cached` of `fetched` were eligible for caching
    Refreshed { fetched: usize, cached: usize },
    /// Tag not handled by this worker
    Ignored,
}

/// Tagged background refresh task
pub struct BackgroundRefresh {
    tag: String,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    source: Arc<dyn PlaylistSource>,
    generations: GenerationSet,
}

impl BackgroundRefresh {
    pub fn new(
        tag: impl Into<String>,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        source: Arc<dyn PlaylistSource>,
        generations: GenerationSet,
    ) -> Self {
        Self {
            tag: tag.into(),
            store,
            transport,
            source,
            generations,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Entry point for the scheduler
    pub async fn run(&self, tag: &str) -> OfflineResult<SyncOutcome> {
        if tag != self.tag {
            debug!("Ignoring background sync '{}'", tag);
            return Ok(SyncOutcome::Ignored);
        }

        info!("Updating playlists in background");
        self.refresh().await.map_err(|e| {
            warn!("Playlist update failed: {}", e);
            OfflineError::BackgroundTask {
                tag: self.tag.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Re-fetch every playlist. Idempotent: running it twice leaves the same
    /// cache contents as running it once.
    async fn refresh(&self) -> OfflineResult<SyncOutcome> {
        let urls = self.source.playlist_urls().await?;
        let generation = self.generations.dynamic_name();
        let mut cached = 0;

        for url in &urls {
            let request = Request::get(url.clone());
            let response = self.transport.fetch(&request).await?;

            if !(200..300).contains(&response.status) {
                return Err(OfflineError::network(
                    url.as_str(),
                    format!("HTTP {}", response.status),
                ));
            }

            if response.is_cacheable() {
                self.store
                    .put(&generation, CacheKey::for_request(&request), response)
                    .await?;
                cached += 1;
            } else {
                debug!("Playlist {} not cacheable, skipping store", url);
            }
        }

        info!("Refreshed {} playlists ({} cached)", urls.len(), cached);
        Ok(SyncOutcome::Refreshed {
            fetched: urls.len(),
            cached,
        })
    }
}
