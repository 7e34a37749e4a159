//! Cache store abstraction
//!
//! The store holds named generations, each a key→response map. Both the
//! lifecycle manager and the interceptor receive the store as an injected
//! `Arc<dyn CacheStore>` rather than reaching for global state:
//! - `MemoryStore`: process-local, used by tests and short-lived hosts
//! - `DiskStore`: persistent across restarts, one directory per generation

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::cache::GenerationUsage;
use crate::error::OfflineResult;
use crate::http::{CacheKey, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Summary of one stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub status: u16,
    pub bytes: u64,
    /// When the entry was written. Diagnostic only, never used for freshness.
    pub stored_at: DateTime<Utc>,
}

/// Persistent key→response storage grouped into named generations
///
/// Implementations must make single-key reads and writes atomic. Concurrent
/// writes to one key are last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the generation if it does not exist yet
    async fn open(&self, name: &str) -> OfflineResult<()>;

    /// All generation names, oldest first
    async fn names(&self) -> OfflineResult<Vec<String>>;

    /// Look up a key in one generation
    async fn match_in(&self, name: &str, key: &CacheKey) -> OfflineResult<Option<Response>>;

    /// Store one entry, creating the generation if needed
    async fn put(&self, name: &str, key: CacheKey, response: Response) -> OfflineResult<()>;

    /// Store every entry or none of them
    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> OfflineResult<()>;

    /// Entries of one generation, sorted by key
    async fn entries(&self, name: &str) -> OfflineResult<Vec<EntryInfo>>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete(&self, name: &str) -> OfflineResult<bool>;

    /// Whether a generation exists
    async fn has(&self, name: &str) -> OfflineResult<bool> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }

    /// Look up a key across every generation, oldest first
    async fn match_any(&self, key: &CacheKey) -> OfflineResult<Option<Response>> {
        for name in self.names().await? {
            if let Some(response) = self.match_in(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Keys of one generation, sorted
    async fn keys(&self, name: &str) -> OfflineResult<Vec<CacheKey>> {
        Ok(self
            .entries(name)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    /// Delete every generation whose name matches `predicate`.
    ///
    /// Deletions are independent: one failure does not stop the others.
    /// Each result is reported alongside its name.
    async fn delete_where(
        &self,
        predicate: &(dyn for<'p> Fn(&'p str) -> bool + Send + Sync),
    ) -> OfflineResult<Vec<(String, OfflineResult<bool>)>> {
        let mut results = Vec::new();
        for name in self.names().await? {
            if predicate(&name) {
                let result = self.delete(&name).await;
                results.push((name, result));
            }
        }
        Ok(results)
    }

    /// Entry count and byte total of one generation
    async fn usage(&self, name: &str) -> OfflineResult<GenerationUsage> {
        let entries = self.entries(name).await?;
        Ok(GenerationUsage {
            name: name.to_string(),
            entries: entries.len(),
            bytes: entries.iter().map(|e| e.bytes).sum(),
        })
    }
}
