//! Cache store abstraction.
//!
//! A [`CacheStorage`] is the store-of-stores: named caches are opened (and
//! created on first use) through it. Each [`Cache`] maps a [`RequestKey`] to
//! a stored [`Response`].

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// A single named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Name this cache was opened under.
    fn name(&self) -> &str;

    /// Returns the stored response for `request`, if any.
    ///
    /// Requests that are not cacheable (anything but `GET`) never match.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>>;

    /// Inserts every entry.
    ///
    /// Lookups through the same storage observe none or all of the batch
    /// while it runs. On failure, entries not yet committed are discarded;
    /// entries already committed stay visible.
    async fn put_all(&self, entries: Vec<(RequestKey, Response)>) -> Result<()>;

    /// Removes an entry, returning whether it existed.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// Returns all stored keys in ascending order.
    async fn keys(&self) -> Result<Vec<RequestKey>>;

    /// Returns the number of stored entries.
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Returns true if nothing is stored.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Opens caches by name.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the cache named `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>>;

    /// Looks `request` up in the cache named `name` without creating it.
    ///
    /// A missing cache is a miss.
    async fn lookup(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if !self.has(name).await? {
            return Ok(None);
        }
        self.open(name).await?.lookup(request).await
    }

    /// Returns true if a cache named `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Deletes the cache named `name`, returning whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Returns the names of all caches in ascending order.
    async fn keys(&self) -> Result<Vec<String>>;
}
