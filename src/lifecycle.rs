//! Cache lifecycle: install-time precache and activation-time cleanup
//!
//! The lifecycle manager is the only component that creates or deletes
//! generations. Install is all-or-nothing; activation cleanup is best-effort.

use crate::cache::{GenerationSet, PrecacheManifest, StorageEstimate};
use crate::error::{OfflineError, OfflineResult};
use crate::http::{CacheKey, Request, Response};
use crate::platform::ClientRegistry;
use crate::store::CacheStore;
use crate::transport::Transport;
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Static generation that was populated
    pub generation: String,
    /// Number of precached entries
    pub entries: usize,
    /// Activate right away instead of waiting for old clients to close
    pub skip_waiting: bool,
}

/// What activation did
#[derive(Debug, Default)]
pub struct ActivateReport {
    /// Stale generations removed
    pub deleted: Vec<String>,
    /// Deletions that failed; retried on the next activation
    pub failures: Vec<OfflineError>,
    /// Clients taken over after cleanup
    pub claimed: usize,
}

/// Owns generation creation and deletion
pub struct LifecycleManager {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    clients: Arc<dyn ClientRegistry>,
    generations: GenerationSet,
    manifest: PrecacheManifest,
    quota_bytes: Option<u64>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        clients: Arc<dyn ClientRegistry>,
        generations: GenerationSet,
        manifest: PrecacheManifest,
    ) -> Self {
        Self {
            store,
            transport,
            clients,
            generations,
            manifest,
            quota_bytes: None,
        }
    }

    /// Quota reported by [`storage_estimate`](Self::storage_estimate)
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn generations(&self) -> &GenerationSet {
        &self.generations
    }

    pub fn manifest(&self) -> &PrecacheManifest {
        &self.manifest
    }

    /// Fetch every manifest asset, then store them all into the static
    /// generation in one atomic write.
    ///
    /// Nothing is written unless every fetch succeeds, so a failed install
    /// leaves the store exactly as it was.
    pub async fn install(&self) -> OfflineResult<InstallOutcome> {
        let generation = self.generations.static_name();
        info!(
            "Installing {}: precaching {} assets",
            generation,
            self.manifest.len()
        );

        let fetches = self.manifest.entries().iter().map(|url| self.precache_one(url));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Install of {} aborted: {}", generation, e);
                return Err(e);
            }
        };

        let count = entries.len();
        self.store
            .put_all(&generation, entries)
            .await
            .map_err(|e| {
                error!("Install of {} aborted while storing: {}", generation, e);
                OfflineError::PrecacheFailure {
                    url: generation.clone(),
                    reason: format!("storing precached assets: {}", e),
                }
            })?;

        info!("Static files cached in {}", generation);
        Ok(InstallOutcome {
            generation,
            entries: count,
            skip_waiting: true,
        })
    }

    /// Whether the current static generation already holds the fallback
    /// document, i.e. a previous run completed the install.
    pub async fn is_installed(&self) -> OfflineResult<bool> {
        let generation = self.generations.static_name();
        if !self.store.has(&generation).await? {
            return Ok(false);
        }
        Ok(self
            .store
            .match_in(&generation, &self.manifest.fallback_key())
            .await?
            .is_some())
    }

    async fn precache_one(&self, url: &Url) -> OfflineResult<(CacheKey, Response)> {
        let request = Request::get(url.clone());
        let response = self
            .transport
            .fetch(&request)
            .await
            .map_err(|e| OfflineError::PrecacheFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !(200..300).contains(&response.status) {
            return Err(OfflineError::PrecacheFailure {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }

        debug!("Precached {} ({} bytes)", url, response.body.len());
        Ok((CacheKey::for_request(&request), response))
    }

    /// Delete every generation that is neither the current static nor the
    /// current dynamic one, then claim open clients.
    ///
    /// Deletion failures are logged and reported but never block the claim.
    pub async fn activate(&self) -> OfflineResult<ActivateReport> {
        info!("Activating {} / {}", self.generations.static_name(), self.generations.dynamic_name());

        let mut report = ActivateReport::default();
        let generations = self.generations.clone();
        let is_stale = move |name: &str| !generations.is_current(name);

        match self.store.delete_where(&is_stale).await {
            Ok(results) => {
                for (name, result) in results {
                    match result {
                        Ok(_) => {
                            info!("Deleted old cache {}", name);
                            report.deleted.push(name);
                        }
                        Err(e) => {
                            warn!("Failed to delete old cache {}: {}", name, e);
                            report.failures.push(OfflineError::Cleanup {
                                generation: name,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list caches during activation: {}", e);
                report.failures.push(OfflineError::Cleanup {
                    generation: "*".to_string(),
                    reason: e.to_string(),
                });
            }
        }

        report.claimed = self.clients.claim().await?;
        info!(
            "Activated: {} stale caches removed, {} clients claimed",
            report.deleted.len(),
            report.claimed
        );
        Ok(report)
    }

    /// Per-generation usage across the whole store
    pub async fn storage_estimate(&self) -> OfflineResult<StorageEstimate> {
        let mut generations = Vec::new();
        for name in self.store.names().await? {
            generations.push(self.store.usage(&name).await?);
        }

        let estimate = StorageEstimate::new(generations, self.quota_bytes);
        debug!("Storage estimate: {}", estimate.summary());
        Ok(estimate)
    }
}
