//! Precache manifest
//!
//! The fixed, ordered list of application-shell assets fetched at install
//! time. Paths are resolved against the application origin once, up front,
//! so the lifecycle manager only ever deals with absolute same-origin URLs.

use crate::error::{OfflineError, OfflineResult};
use crate::http::CacheKey;
use url::Url;

/// Ordered list of assets stored into the static generation on install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheManifest {
    entries: Vec<Url>,
    fallback: Url,
}

impl PrecacheManifest {
    /// Resolve `paths` against `origin`.
    ///
    /// Duplicates are dropped (first occurrence wins). Every path must stay on
    /// the origin, and the fallback document must be one of the entries.
    pub fn new<S: AsRef<str>>(origin: &Url, paths: &[S], fallback: &str) -> OfflineResult<Self> {
        if paths.is_empty() {
            return Err(OfflineError::ManifestInvalid(
                "precache list is empty".to_string(),
            ));
        }

        let mut entries: Vec<Url> = Vec::with_capacity(paths.len());
        for path in paths {
            let url = resolve(origin, path.as_ref())?;
            if !entries.contains(&url) {
                entries.push(url);
            }
        }

        let fallback = resolve(origin, fallback)?;
        if !entries.contains(&fallback) {
            return Err(OfflineError::ManifestInvalid(format!(
                "fallback document {} is not precached",
                fallback.path()
            )));
        }

        Ok(Self { entries, fallback })
    }

    /// Absolute URLs in manifest order
    pub fn entries(&self) -> &[Url] {
        &self.entries
    }

    /// Document served for failed navigations
    pub fn fallback(&self) -> &Url {
        &self.fallback
    }

    pub fn fallback_key(&self) -> CacheKey {
        CacheKey::get(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve(origin: &Url, path: &str) -> OfflineResult<Url> {
    let url = origin
        .join(path)
        .map_err(|e| OfflineError::invalid_url(path, e))?;

    if url.origin() != origin.origin() {
        return Err(OfflineError::ManifestInvalid(format!(
            "{} resolves outside the application origin",
            path
        )));
    }

    Ok(url)
}
