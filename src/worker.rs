//! Install and fetch handlers.
//!
//! [`ServiceWorker`] models the two lifecycle signals a host delivers: a
//! one-time install and a fetch per intercepted request. [`CacheFirst`] is the
//! cache-first, network-fallback implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, RequestKey, Response};
use crate::storage::{Cache, CacheStorage};

/// Handlers for the install and fetch lifecycle signals.
#[async_trait]
pub trait ServiceWorker: Send + Sync {
    /// Handles the install signal.
    async fn on_install(&self) -> Result<()>;

    /// Handles a fetch signal for `request`.
    async fn on_fetch(&self, request: Request) -> Result<Response>;
}

/// Pre-caches a fixed resource list on install and serves cache-first on fetch.
///
/// Hits return the stored response without touching the network. Misses go
/// to the network once and are not written back.
pub struct CacheFirst<S, N> {
    config: CacheConfig,
    storage: S,
    network: N,
}

impl<S: CacheStorage, N: Network> CacheFirst<S, N> {
    /// Creates a worker over the given store and network.
    #[must_use]
    pub const fn new(config: CacheConfig, storage: S, network: N) -> Self {
        Self {
            config,
            storage,
            network,
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cache name.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the underlying network.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    async fn open(&self) -> Result<Arc<dyn Cache>> {
        self.storage.open(&self.config.cache_name).await
    }

    /// Fetches one pre-cache resource, requiring a success status.
    async fn fetch_resource(&self, resource: &str) -> Result<(RequestKey, Response)> {
        let request = Request::get(resource);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| e.for_resource(resource))?;
        if !response.is_success() {
            return Err(Error::BadStatus {
                resource: resource.to_string(),
                status: response.status,
            });
        }
        Ok((request.key(), response))
    }
}

#[async_trait]
impl<S: CacheStorage, N: Network> ServiceWorker for CacheFirst<S, N> {
    async fn on_install(&self) -> Result<()> {
        log::info!(
            "Installing cache {} ({} resources)",
            self.config.cache_name,
            self.config.precache.len()
        );
        let cache = self.open().await?;

        let fetches = self
            .config
            .precache
            .iter()
            .map(|resource| self.fetch_resource(resource));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Install of cache {} failed: {e}", self.config.cache_name);
                return Err(e);
            }
        };

        cache.put_all(entries).await?;
        log::info!("Installed cache {}", self.config.cache_name);
        Ok(())
    }

    async fn on_fetch(&self, request: Request) -> Result<Response> {
        match self.storage.lookup(&self.config.cache_name, &request).await {
            Ok(Some(response)) => {
                log::debug!("Cache hit: {} {}", request.method, request.path);
                return Ok(response);
            }
            Ok(None) => log::debug!("Cache miss: {} {}", request.method, request.path),
            Err(e) => log::warn!(
                "Cache {} unavailable, using network for {}: {e}",
                self.config.cache_name,
                request.path
            ),
        }
        self.network.fetch(&request).await
    }
}
