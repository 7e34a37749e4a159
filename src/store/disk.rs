//! Filesystem-backed cache store
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//!   leoiptv-static-v1/
//!     generation.json          # name + creation time
//!     entries/
//!       <sha256(key)>.json     # key, status, type, headers, body file name
//!       <uuid>.body            # raw body snapshot
//! ```
//!
//! Every file is written to a temporary name and renamed into place, so a
//! reader sees either the old entry or the new one. Bodies get a fresh file
//! per write and the metadata file points at it; the previous body is removed
//! after the metadata swap.
//!
//! Bulk writes build a complete copy of the generation under a dot-prefixed
//! staging directory and rename it over the live one, so a failed bulk write
//! leaves the generation exactly as it was.

use super::{CacheStore, EntryInfo};
use crate::error::{OfflineError, OfflineResult};
use crate::http::{CacheKey, Response, ResponseType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

const GENERATION_META: &str = "generation.json";
const ENTRIES_DIR: &str = "entries";

#[derive(Debug, Serialize, Deserialize)]
struct GenerationMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    url: Url,
    status: u16,
    response_type: ResponseType,
    headers: Vec<(String, String)>,
    body_file: String,
    body_len: u64,
    stored_at: DateTime<Utc>,
}

/// Persistent store rooted at a directory
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open_at(root: impl Into<PathBuf>) -> OfflineResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| OfflineError::io(format!("creating store root {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> OfflineResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    async fn create_generation(&self, name: &str) -> OfflineResult<PathBuf> {
        let dir = self.generation_dir(name)?;
        if fs::try_exists(dir.join(GENERATION_META)).await.unwrap_or(false) {
            return Ok(dir);
        }

        // Build in a staging dir and rename, so a half-created generation
        // never shows up in `names()`.
        let staging = self.root.join(format!(".staging-{}", Uuid::new_v4()));
        init_generation_dir(&staging, name).await?;

        match fs::rename(&staging, &dir).await {
            Ok(()) => {
                debug!("Created generation {}", name);
                Ok(dir)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging).await;
                // Lost a creation race: the other writer's directory is fine.
                if fs::try_exists(dir.join(GENERATION_META)).await.unwrap_or(false) {
                    Ok(dir)
                } else {
                    Err(OfflineError::io(format!("creating generation {}", name), e))
                }
            }
        }
    }

    async fn read_meta(&self, dir: &Path, key: &CacheKey) -> OfflineResult<Option<EntryMeta>> {
        let path = dir.join(ENTRIES_DIR).join(meta_file_name(key));
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OfflineError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Write the body and a temporary metadata file. Nothing is visible
    /// until [`commit_entry`] renames the metadata into place.
    async fn stage_entry(
        &self,
        dir: &Path,
        key: CacheKey,
        response: Response,
    ) -> OfflineResult<StagedEntry> {
        let entries_dir = dir.join(ENTRIES_DIR);
        let body_file = format!("{}.body", Uuid::new_v4());
        let body_path = entries_dir.join(&body_file);

        fs::write(&body_path, &response.body)
            .await
            .map_err(|e| OfflineError::io(format!("writing {}", body_path.display()), e))?;

        let meta = EntryMeta {
            url: response.url,
            status: response.status,
            response_type: response.response_type,
            headers: response.headers,
            body_len: response.body.len() as u64,
            body_file,
            stored_at: Utc::now(),
            key,
        };
        let meta_path = entries_dir.join(meta_file_name(&meta.key));
        let tmp_path = entries_dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let content = serde_json::to_string(&meta)?;
        if let Err(e) = fs::write(&tmp_path, content).await {
            let _ = fs::remove_file(&body_path).await;
            return Err(OfflineError::io(format!("writing {}", tmp_path.display()), e));
        }

        Ok(StagedEntry {
            tmp_path,
            meta_path,
            body_path,
        })
    }

    async fn commit_entry(&self, dir: &Path, staged: &StagedEntry) -> OfflineResult<()> {
        let previous = match fs::read_to_string(&staged.meta_path).await {
            Ok(content) => serde_json::from_str::<EntryMeta>(&content)
                .ok()
                .map(|meta| meta.body_file),
            Err(_) => None,
        };

        fs::rename(&staged.tmp_path, &staged.meta_path)
            .await
            .map_err(|e| {
                OfflineError::io(format!("committing {}", staged.meta_path.display()), e)
            })?;

        if let Some(old_body) = previous {
            let old_path = dir.join(ENTRIES_DIR).join(old_body);
            if old_path != staged.body_path {
                let _ = fs::remove_file(old_path).await;
            }
        }
        Ok(())
    }

    /// Populate `staging` with the current contents of `dir` (if any) plus
    /// `entries`. Returns the number of entries written.
    async fn build_staged(
        &self,
        staging: &Path,
        dir: &Path,
        name: &str,
        exists: bool,
        entries: Vec<(CacheKey, Response)>,
    ) -> OfflineResult<usize> {
        if exists {
            copy_generation(dir, staging).await?;
        } else {
            init_generation_dir(staging, name).await?;
        }

        let count = entries.len();
        for (key, response) in entries {
            let staged = self.stage_entry(staging, key, response).await?;
            self.commit_entry(staging, &staged).await?;
        }
        Ok(count)
    }

    /// Replace an existing generation directory with a fully built one
    async fn swap_in(&self, staging: &Path, dir: &Path, name: &str) -> OfflineResult<()> {
        let trash = self.root.join(format!(".trash-{}", Uuid::new_v4()));
        if let Err(e) = fs::rename(dir, &trash).await {
            let _ = fs::remove_dir_all(staging).await;
            return Err(OfflineError::io(format!("replacing generation {}", name), e));
        }

        if let Err(e) = fs::rename(staging, dir).await {
            let _ = fs::rename(&trash, dir).await;
            let _ = fs::remove_dir_all(staging).await;
            return Err(OfflineError::io(format!("publishing generation {}", name), e));
        }

        if let Err(e) = fs::remove_dir_all(&trash).await {
            warn!("Failed to remove {}: {}", trash.display(), e);
        }
        Ok(())
    }

    async fn discard(staged: &[StagedEntry]) {
        for entry in staged {
            let _ = fs::remove_file(&entry.tmp_path).await;
            let _ = fs::remove_file(&entry.body_path).await;
        }
    }
}

struct StagedEntry {
    tmp_path: PathBuf,
    meta_path: PathBuf,
    body_path: PathBuf,
}

async fn init_generation_dir(dir: &Path, name: &str) -> OfflineResult<()> {
    fs::create_dir_all(dir.join(ENTRIES_DIR))
        .await
        .map_err(|e| OfflineError::io(format!("creating {}", dir.display()), e))?;

    let meta = GenerationMeta {
        name: name.to_string(),
        created_at: Utc::now(),
    };
    let content = serde_json::to_string_pretty(&meta)?;
    fs::write(dir.join(GENERATION_META), content)
        .await
        .map_err(|e| OfflineError::io(format!("writing generation meta for {}", name), e))
}

/// Copy a committed generation. Temporary files of in-flight writes are left
/// behind.
async fn copy_generation(src: &Path, dst: &Path) -> OfflineResult<()> {
    let dst_entries = dst.join(ENTRIES_DIR);
    fs::create_dir_all(&dst_entries)
        .await
        .map_err(|e| OfflineError::io(format!("creating {}", dst.display()), e))?;
    fs::copy(src.join(GENERATION_META), dst.join(GENERATION_META))
        .await
        .map_err(|e| OfflineError::io(format!("copying meta of {}", src.display()), e))?;

    let src_entries = src.join(ENTRIES_DIR);
    let mut read = fs::read_dir(&src_entries)
        .await
        .map_err(|e| OfflineError::io(format!("reading {}", src_entries.display()), e))?;
    while let Some(entry) = read
        .next_entry()
        .await
        .map_err(|e| OfflineError::io("reading cache entry", e))?
    {
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }
        fs::copy(entry.path(), dst_entries.join(&file_name))
            .await
            .map_err(|e| OfflineError::io(format!("copying {}", entry.path().display()), e))?;
    }
    Ok(())
}

/// Generation names become directory names, so keep them to a safe charset
fn validate_name(name: &str) -> OfflineResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(OfflineError::Internal(format!(
            "invalid generation name '{}'",
            name
        )))
    }
}

fn meta_file_name(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    format!("{}.json", hex::encode(hasher.finalize()))
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, name: &str) -> OfflineResult<()> {
        self.create_generation(name).await.map(|_| ())
    }

    async fn names(&self) -> OfflineResult<Vec<String>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| OfflineError::io("reading store root", e))?;

        let mut found: Vec<(DateTime<Utc>, String)> = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| OfflineError::io("reading store entry", e))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }

            let meta_path = entry.path().join(GENERATION_META);
            let meta = match fs::read_to_string(&meta_path).await {
                Ok(content) => serde_json::from_str::<GenerationMeta>(&content),
                Err(_) => continue,
            };
            match meta {
                Ok(meta) => found.push((meta.created_at, meta.name)),
                Err(e) => warn!("Skipping generation with unreadable meta {}: {}", file_name, e),
            }
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> OfflineResult<Option<Response>> {
        let dir = self.generation_dir(name)?;
        let Some(meta) = self.read_meta(&dir, key).await? else {
            return Ok(None);
        };

        let body_path = dir.join(ENTRIES_DIR).join(&meta.body_file);
        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            // Body swapped out by a concurrent writer between reads
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OfflineError::io(format!("reading {}", body_path.display()), e)),
        };

        Ok(Some(Response {
            url: meta.url,
            status: meta.status,
            response_type: meta.response_type,
            headers: meta.headers,
            body: Bytes::from(body),
        }))
    }

    async fn put(&self, name: &str, key: CacheKey, response: Response) -> OfflineResult<()> {
        let dir = self.create_generation(name).await?;
        let staged = self.stage_entry(&dir, key, response).await?;
        if let Err(e) = self.commit_entry(&dir, &staged).await {
            Self::discard(std::slice::from_ref(&staged)).await;
            return Err(e);
        }
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> OfflineResult<()> {
        let dir = self.generation_dir(name)?;
        let exists = fs::try_exists(dir.join(GENERATION_META)).await.unwrap_or(false);

        // The whole generation is rebuilt in a private directory and only
        // becomes visible once every entry is committed there.
        let staging = self.root.join(format!(".staging-{}", Uuid::new_v4()));
        let count = match self.build_staged(&staging, &dir, name, exists, entries).await {
            Ok(count) => count,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        if exists {
            self.swap_in(&staging, &dir, name).await?;
        } else if let Err(e) = fs::rename(&staging, &dir).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(OfflineError::io(format!("publishing generation {}", name), e));
        }

        debug!("Stored {} entries into {}", count, name);
        Ok(())
    }

    async fn entries(&self, name: &str) -> OfflineResult<Vec<EntryInfo>> {
        let dir = self.generation_dir(name)?;
        let entries_dir = dir.join(ENTRIES_DIR);
        let mut read = match fs::read_dir(&entries_dir).await {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OfflineError::GenerationNotFound(name.to_string()))
            }
            Err(e) => return Err(OfflineError::io(format!("reading {}", entries_dir.display()), e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read
            .next_entry()
            .await
            .map_err(|e| OfflineError::io("reading cache entry", e))?
        {
            let path = entry.path();
            let is_meta = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_meta {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(OfflineError::io(format!("reading {}", path.display()), e)),
            };
            let meta: EntryMeta = serde_json::from_str(&content)?;
            entries.push(EntryInfo {
                key: meta.key,
                status: meta.status,
                bytes: meta.body_len,
                stored_at: meta.stored_at,
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, name: &str) -> OfflineResult<bool> {
        let dir = self.generation_dir(name)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(false);
        }

        // Move aside first so the generation disappears atomically for readers.
        let trash = self.root.join(format!(".trash-{}", Uuid::new_v4()));
        fs::rename(&dir, &trash)
            .await
            .map_err(|e| OfflineError::io(format!("deleting generation {}", name), e))?;
        fs::remove_dir_all(&trash)
            .await
            .map_err(|e| OfflineError::io(format!("removing {}", trash.display()), e))?;

        debug!("Deleted generation {}", name);
        Ok(true)
    }
}
