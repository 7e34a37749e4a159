//! In-memory cache store

use super::{CacheStore, EntryInfo};
use crate::error::{OfflineError, OfflineResult};
use crate::http::{CacheKey, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredEntry {
    response: Response,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
struct MemoryGeneration {
    name: String,
    entries: HashMap<CacheKey, StoredEntry>,
}

/// Process-local store. Generations keep their creation order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    generations: RwLock<Vec<MemoryGeneration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_or_create<'a>(
    generations: &'a mut Vec<MemoryGeneration>,
    name: &str,
) -> &'a mut MemoryGeneration {
    let index = match generations.iter().position(|g| g.name == name) {
        Some(index) => index,
        None => {
            generations.push(MemoryGeneration {
                name: name.to_string(),
                entries: HashMap::new(),
            });
            generations.len() - 1
        }
    };
    &mut generations[index]
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> OfflineResult<()> {
        let mut generations = self.generations.write().await;
        find_or_create(&mut generations, name);
        Ok(())
    }

    async fn names(&self) -> OfflineResult<Vec<String>> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> OfflineResult<Option<Response>> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.entries.get(key))
            .map(|entry| entry.response.clone()))
    }

    async fn put(&self, name: &str, key: CacheKey, response: Response) -> OfflineResult<()> {
        let mut generations = self.generations.write().await;
        let generation = find_or_create(&mut generations, name);
        generation.entries.insert(
            key,
            StoredEntry {
                response,
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> OfflineResult<()> {
        // Single write-lock section: readers see all entries or none.
        let mut generations = self.generations.write().await;
        let generation = find_or_create(&mut generations, name);
        let stored_at = Utc::now();
        for (key, response) in entries {
            generation
                .entries
                .insert(key, StoredEntry { response, stored_at });
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> OfflineResult<Vec<EntryInfo>> {
        let generations = self.generations.read().await;
        let generation = generations
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| OfflineError::GenerationNotFound(name.to_string()))?;

        let mut entries: Vec<EntryInfo> = generation
            .entries
            .iter()
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                status: entry.response.status,
                bytes: entry.response.body.len() as u64,
                stored_at: entry.stored_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, name: &str) -> OfflineResult<bool> {
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|g| g.name != name);
        Ok(generations.len() != before)
    }
}
