//! Request interception and resolution policy
//!
//! Cache-first with network fallback:
//!
//! | Situation | Result | Cache effect |
//! |-----------|--------|--------------|
//! | Non-GET or cross-origin | pass through | none |
//! | Entry in any generation | stored response | none |
//! | Miss, eligible network response | network response | detached write to dynamic |
//! | Miss, ineligible network response | network response, unmodified | none |
//! | Miss, network error, navigation | fallback document | none |
//! | Miss, network error, other | error | none |

use crate::cache::{GenerationSet, PrecacheManifest};
use crate::error::{OfflineError, OfflineResult};
use crate::http::{CacheKey, Request, Response};
use crate::store::CacheStore;
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// Where a resolved response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Offline document substituted for a failed navigation
    Fallback,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// A response produced by the interceptor
#[derive(Debug)]
pub struct Resolved {
    pub response: Response,
    pub source: ResponseSource,
    /// Pending write of this response into the dynamic generation.
    ///
    /// Dropping the handle detaches the write; it still runs to completion.
    /// Awaiting it never yields an error: write failures are logged inside
    /// the task and are not observable by the caller.
    pub cache_write: Option<JoinHandle<()>>,
}

impl Resolved {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            cache_write: None,
        }
    }
}

/// Outcome of offering a request to the interceptor
#[derive(Debug)]
pub enum Interception {
    /// Not ours: the host should perform the request itself
    PassThrough,
    Responded(Resolved),
    /// Network failure with no fallback available
    Failed(OfflineError),
}

impl Interception {
    /// The response, if one was produced
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Responded(resolved) => Some(&resolved.response),
            _ => None,
        }
    }
}

/// Resolves intercepted requests against the cache and network
pub struct Interceptor {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    origin: Url,
    generations: GenerationSet,
    fallback: CacheKey,
}

impl Interceptor {
    pub fn new(
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        origin: Url,
        generations: GenerationSet,
        manifest: &PrecacheManifest,
    ) -> Self {
        Self {
            store,
            transport,
            origin,
            generations,
            fallback: manifest.fallback_key(),
        }
    }

    /// Whether the request is handled here at all
    pub fn intercepts(&self, request: &Request) -> bool {
        request.is_get() && request.is_same_origin(&self.origin)
    }

    /// Offer a request to the interceptor
    pub async fn handle(&self, request: &Request) -> Interception {
        if !self.intercepts(request) {
            return Interception::PassThrough;
        }

        match self.resolve(request).await {
            Ok(resolved) => Interception::Responded(resolved),
            Err(e) => Interception::Failed(e),
        }
    }

    /// Resolve an intercepted request. Callers are expected to have checked
    /// [`intercepts`](Self::intercepts).
    pub async fn resolve(&self, request: &Request) -> OfflineResult<Resolved> {
        let key = CacheKey::for_request(request);

        match self.store.match_any(&key).await {
            Ok(Some(cached)) => {
                debug!("Serving from cache {}", key);
                return Ok(Resolved::new(cached, ResponseSource::Cache));
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed, going to network: {}", key, e),
        }

        match self.transport.fetch(request).await {
            Ok(response) if response.is_cacheable() => {
                let cache_write = self.spawn_cache_write(key, response.clone());
                Ok(Resolved {
                    response,
                    source: ResponseSource::Network,
                    cache_write: Some(cache_write),
                })
            }
            Ok(response) => {
                debug!(
                    "Not caching {} (status {}, type {})",
                    key, response.status, response.response_type
                );
                Ok(Resolved::new(response, ResponseSource::Network))
            }
            Err(e) => {
                error!("Fetch failed {}: {}", key, e);
                if request.is_navigation() {
                    if let Some(fallback) = self.fallback_document().await {
                        return Ok(Resolved::new(fallback, ResponseSource::Fallback));
                    }
                }
                Err(e)
            }
        }
    }

    async fn fallback_document(&self) -> Option<Response> {
        let generation = self.generations.static_name();
        match self.store.match_in(&generation, &self.fallback).await {
            Ok(Some(response)) => {
                debug!("Serving offline fallback {}", self.fallback);
                Some(response)
            }
            Ok(None) => {
                warn!("Fallback {} missing from {}", self.fallback, generation);
                None
            }
            Err(e) => {
                warn!("Fallback lookup in {} failed: {}", generation, e);
                None
            }
        }
    }

    /// Store a copy in the dynamic generation without blocking the caller
    fn spawn_cache_write(&self, key: CacheKey, response: Response) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let generation = self.generations.dynamic_name();

        tokio::spawn(async move {
            debug!("Caching dynamic resource {}", key);
            if let Err(e) = store.put(&generation, key.clone(), response).await {
                let err = OfflineError::CacheWrite {
                    generation,
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
            }
        })
    }
}
