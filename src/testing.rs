//! Test doubles for the store and network capabilities.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, RequestKey, Response};
use crate::storage::{Cache, CacheStorage};

/// Network that answers from a route table and counts calls.
///
/// Unknown paths get a `404`. When offline every call fails.
#[derive(Debug, Default)]
pub struct FakeNetwork {
    routes: HashMap<RequestKey, Response>,
    offline: bool,
    calls: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, path: &str, response: Response) -> Self {
        self.routes.insert(RequestKey::new(path), response);
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(Error::Network(format!("offline: {}", request.path)));
        }
        Ok(self
            .routes
            .get(&request.key())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Storage whose every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStorage;

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        Err(Error::StoreUnavailable(format!("quota exceeded opening {name}")))
    }

    async fn has(&self, _name: &str) -> Result<bool> {
        Err(Error::StoreUnavailable("quota exceeded".into()))
    }

    async fn delete(&self, _name: &str) -> Result<bool> {
        Err(Error::StoreUnavailable("quota exceeded".into()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Err(Error::StoreUnavailable("quota exceeded".into()))
    }
}
