//! In-process cache storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cache, CacheStorage};
use crate::error::Result;
use crate::request::{Request, RequestKey, Response};

/// Cache storage held entirely in memory.
///
/// Cloning shares the underlying caches.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    caches: Arc<RwLock<BTreeMap<String, Arc<MemoryCache>>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)));
        Ok(Arc::clone(cache) as Arc<dyn Cache>)
    }

    async fn lookup(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        let cache = self.caches.read().await.get(name).cloned();
        match cache {
            Some(cache) => cache.lookup(request).await,
            None => Ok(None),
        }
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }
}

#[derive(Debug)]
struct MemoryCache {
    name: String,
    entries: RwLock<BTreeMap<RequestKey, Response>>,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        Ok(self.entries.read().await.get(&request.key()).cloned())
    }

    async fn put_all(&self, entries: Vec<(RequestKey, Response)>) -> Result<()> {
        let mut stored = self.entries.write().await;
        stored.extend(entries);
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
