//! precache - A cache-first offline helper for web assets.
//!
//! On install a fixed list of assets is fetched and stored in a named cache.
//! On every fetch the stored response is served if present; otherwise the
//! request goes to the network and the result is returned without being
//! stored.
//!
//! # Example
//!
//! ```no_run
//! use precache::{CacheConfig, CacheFirst, HttpNetwork, MemoryStorage, Request, ServiceWorker};
//!
//! # async fn example() -> precache::Result<()> {
//! let config = CacheConfig::new()
//!     .with_cache_name("site-v1")
//!     .with_precache(["/", "/styles.css"]);
//! let worker = CacheFirst::new(
//!     config,
//!     MemoryStorage::new(),
//!     HttpNetwork::new("http://127.0.0.1:8000")?,
//! );
//!
//! // Pre-cache the asset list; fails if any asset cannot be fetched.
//! worker.on_install().await?;
//!
//! // Served from the cache, no network call.
//! let response = worker.on_fetch(Request::get("/styles.css")).await?;
//! println!("{} bytes", response.body.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod network;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig, NetworkConfig, ServerConfig, StorageConfig};
pub use error::{Error, Result};
pub use network::{HttpNetwork, Network};
pub use request::{Request, RequestKey, Response};
pub use storage::{Cache, CacheStorage, DiskStorage, MemoryStorage};
pub use worker::{CacheFirst, ServiceWorker};
