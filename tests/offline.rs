//! End-to-end behaviour of the cache-first worker against both stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use precache::{
    CacheConfig, CacheFirst, CacheStorage, DiskStorage, Error, MemoryStorage, Network, Request,
    RequestKey, Response, ServiceWorker,
};
use tempfile::TempDir;

/// Serves a fixed set of assets and counts every call.
#[derive(Default)]
struct Origin {
    assets: HashMap<String, Response>,
    calls: AtomicUsize,
}

impl Origin {
    fn with(assets: &[(&str, &str)]) -> Self {
        Self {
            assets: assets
                .iter()
                .map(|(path, body)| ((*path).to_string(), Response::new(200, body.to_string())))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for Origin {
    async fn fetch(&self, request: &Request) -> precache::Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.assets
            .get(request.key().as_str())
            .cloned()
            .ok_or_else(|| Error::Network(format!("connection reset fetching {}", request.path)))
    }
}

fn site() -> Origin {
    Origin::with(&[
        ("/", "<html>home</html>"),
        ("/styles.css", "body { margin: 0 }"),
        ("/app.js", "main();"),
    ])
}

fn v1() -> CacheConfig {
    CacheConfig::new()
        .with_cache_name("v1")
        .with_precache(["/", "/styles.css"])
}

async fn run_scenario<S: CacheStorage>(storage: S) {
    let worker = CacheFirst::new(v1(), storage, site());
    worker.on_install().await.unwrap();
    assert_eq!(worker.network().calls(), 2);

    let cache = worker.storage().open("v1").await.unwrap();
    assert_eq!(
        cache.keys().await.unwrap(),
        vec![RequestKey::new("/"), RequestKey::new("/styles.css")]
    );

    // Hit: zero network calls.
    let css = worker.on_fetch(Request::get("/styles.css")).await.unwrap();
    assert_eq!(css.body, "body { margin: 0 }");
    assert_eq!(worker.network().calls(), 2);

    // Miss: exactly one network call, nothing written back.
    let js = worker.on_fetch(Request::get("/app.js")).await.unwrap();
    assert_eq!(js.body, "main();");
    assert_eq!(worker.network().calls(), 3);
    assert_eq!(cache.len().await.unwrap(), 2);
}

#[tokio::test]
async fn scenario_with_memory_storage() {
    run_scenario(MemoryStorage::new()).await;
}

#[tokio::test]
async fn scenario_with_disk_storage() {
    let dir = TempDir::new().unwrap();
    run_scenario(DiskStorage::new(dir.path())).await;
}

#[tokio::test]
async fn installed_cache_serves_offline_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let worker = CacheFirst::new(v1(), DiskStorage::new(dir.path()), site());
        worker.on_install().await.unwrap();
    }

    // New process, origin gone.
    let worker = CacheFirst::new(v1(), DiskStorage::new(dir.path()), Origin::default());
    let home = worker.on_fetch(Request::get("/")).await.unwrap();
    assert_eq!(home.body, "<html>home</html>");
    assert_eq!(worker.network().calls(), 0);

    let err = worker.on_fetch(Request::get("/app.js")).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert_eq!(worker.network().calls(), 1);
}

#[tokio::test]
async fn failed_install_leaves_store_empty() {
    let dir = TempDir::new().unwrap();
    let config = v1().with_precache(["/", "/styles.css", "/missing.png"]);
    let worker = CacheFirst::new(config, DiskStorage::new(dir.path()), site());

    let err = worker.on_install().await.unwrap_err();
    assert!(matches!(err, Error::Install { ref resource, .. } if resource == "/missing.png"));

    let cache = worker.storage().open("v1").await.unwrap();
    assert!(cache.is_empty().await.unwrap());
}

#[tokio::test]
async fn duplicate_resources_stored_once_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = v1().with_precache(["/", "/"]);
    let worker = CacheFirst::new(config, DiskStorage::new(dir.path()), site());

    worker.on_install().await.unwrap();
    assert_eq!(worker.network().calls(), 2);

    let cache = worker.storage().open("v1").await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn miss_before_install_leaves_disk_untouched() {
    let dir = TempDir::new().unwrap();
    let worker = CacheFirst::new(v1(), DiskStorage::new(dir.path()), site());

    worker.on_fetch(Request::get("/app.js")).await.unwrap();
    assert_eq!(worker.network().calls(), 1);
    assert!(!worker.storage().has("v1").await.unwrap());
    assert!(worker.storage().keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn cache_names_do_not_share_entries() {
    let storage = MemoryStorage::new();
    let first = CacheFirst::new(v1(), storage.clone(), site());
    first.on_install().await.unwrap();

    let second = CacheFirst::new(v1().with_cache_name("v2"), storage, site());
    second.on_fetch(Request::get("/")).await.unwrap();
    assert_eq!(second.network().calls(), 1);
}
