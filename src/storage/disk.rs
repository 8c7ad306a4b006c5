//! Durable cache storage backed by a directory tree.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<sha256(cache name)>/cache.json        cache name and creation time
//! <root>/<sha256(cache name)>/<sha256(key)>.json  one stored entry
//! ```
//!
//! Entries and metadata are written to uniquely named temporary files and
//! renamed into place.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use super::{Cache, CacheStorage};
use crate::error::{Error, Result};
use crate::request::{Request, RequestKey, Response};

const META_FILE: &str = "cache.json";

fn digest(s: &str) -> String {
    format!("{:x}", Sha256::digest(s.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    name: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64-encoded body.
    body: String,
    stored_at: DateTime<Utc>,
}

impl EntryRecord {
    fn new(key: RequestKey, response: Response) -> Self {
        Self {
            key,
            status: response.status,
            headers: response.headers,
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    fn into_response(self) -> Result<Response> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| Error::StoreUnavailable(format!("corrupt entry {}: {e}", self.key)))?;
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body: Bytes::from(body),
        })
    }
}

/// Cache storage persisted to the local file system.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    open: Arc<Mutex<HashMap<String, Arc<DiskCache>>>>,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(digest(name))
    }

    /// Returns the shared handle for `name` without touching the file system.
    async fn handle(&self, name: &str) -> Arc<DiskCache> {
        let mut open = self.open.lock().await;
        let cache = open
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DiskCache::new(name, self.cache_dir(name))));
        Arc::clone(cache)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        let cache = self.handle(name).await;
        cache.ensure_created().await?;
        Ok(cache as Arc<dyn Cache>)
    }

    async fn lookup(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if !request.is_cacheable() || !self.has(name).await? {
            return Ok(None);
        }
        self.handle(name).await.lookup(request).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.cache_dir(name).join(META_FILE))
            .await
            .is_ok())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let handle = self.open.lock().await.remove(name);
        let _guard = match &handle {
            Some(cache) => {
                let guard = cache.lock.write().await;
                cache.deleted.store(true, Ordering::SeqCst);
                Some(guard)
            }
            None => None,
        };
        match tokio::fs::remove_dir_all(self.cache_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let meta_path = entry.path().join(META_FILE);
            let Ok(bytes) = tokio::fs::read(&meta_path).await else {
                continue;
            };
            match serde_json::from_slice::<CacheMeta>(&bytes) {
                Ok(meta) => names.push(meta.name),
                Err(e) => log::warn!("Skipping unreadable cache at {}: {e}", meta_path.display()),
            }
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
struct DiskCache {
    name: String,
    dir: PathBuf,
    // Serializes batches against lookups within this process.
    lock: RwLock<()>,
    // Set once the store is deleted; the handle never writes again.
    deleted: AtomicBool,
}

impl DiskCache {
    fn new(name: &str, dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            dir,
            lock: RwLock::new(()),
            deleted: AtomicBool::new(false),
        }
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.json", digest(key.as_str())))
    }

    /// Writes the metadata file if the store does not exist yet.
    ///
    /// Entry files left without metadata belong to a deleted store and are
    /// removed first, so a new store always starts empty.
    async fn ensure_created(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        let meta_path = self.dir.join(META_FILE);
        if tokio::fs::metadata(&meta_path).await.is_ok() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        clear_entries(&self.dir).await?;
        let meta = CacheMeta {
            name: self.name.clone(),
            created: Utc::now(),
        };
        write_atomic(&meta_path, &serde_json::to_vec(&meta)?).await?;
        log::debug!("Created cache store {} at {}", self.name, self.dir.display());
        Ok(())
    }

    /// Fails unless the store this handle belongs to still exists.
    async fn ensure_live(&self) -> Result<()> {
        let exists = tokio::fs::metadata(self.dir.join(META_FILE)).await.is_ok();
        if self.is_deleted() || !exists {
            return Err(Error::StoreUnavailable(format!(
                "cache {} was deleted",
                self.name
            )));
        }
        Ok(())
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<EntryRecord>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::StoreUnavailable(format!("corrupt entry {}: {e}", path.display())))
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        let key = request.key();
        let _guard = self.lock.read().await;
        if self.is_deleted() {
            return Ok(None);
        }
        match self.read_entry(&self.entry_path(&key)).await? {
            Some(record) if record.key == key => record.into_response().map(Some),
            _ => Ok(None),
        }
    }

    async fn put_all(&self, entries: Vec<(RequestKey, Response)>) -> Result<()> {
        let _guard = self.lock.write().await;
        self.ensure_live().await?;

        // Stage every entry before making any of them visible.
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let path = self.entry_path(&key);
            let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
            let write = async {
                let json = serde_json::to_vec(&EntryRecord::new(key, response))?;
                tokio::fs::write(&tmp, json).await?;
                Ok::<(), Error>(())
            };
            if let Err(e) = write.await {
                let _ = tokio::fs::remove_file(&tmp).await;
                discard(&staged).await;
                return Err(e);
            }
            staged.push((tmp, path));
        }

        for (i, (tmp, path)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(tmp, path).await {
                discard(&staged[i..]).await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let _guard = self.lock.write().await;
        if self.is_deleted() {
            return Ok(false);
        }
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let _guard = self.lock.read().await;
        if self.is_deleted() {
            return Ok(Vec::new());
        }
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }
            if let Some(record) = self.read_entry(&path).await? {
                keys.push(record.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path.file_name().is_some_and(|n| n != META_FILE)
}

/// Removes every entry file in `dir`, leaving metadata and temporaries alone.
async fn clear_entries(dir: &Path) -> Result<()> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if !is_entry_file(&path) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => log::debug!("Removed stray entry {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Deletes staged temporary files that were never renamed into place.
async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}

/// Writes `contents` to a uniquely named temporary sibling of `path` and
/// renames it into place.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
