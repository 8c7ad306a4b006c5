//! Network capability used on install and on cache misses.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Performs requests over the network.
///
/// HTTP error statuses are returned as responses; only transport failures
/// are errors.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs `request` and returns the response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Headers that describe a single hop and are not forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Builds a configured HTTP client for origin requests.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// [`Network`] implementation that sends requests to a fixed origin with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: String,
}

impl HttpNetwork {
    /// Creates a network bound to `origin`, e.g. `https://example.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(origin: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(build_http_client()?, origin))
    }

    /// Creates a network using an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, origin: impl Into<String>) -> Self {
        let origin = origin.into().trim_end_matches('/').to_string();
        Self { client, origin }
    }

    /// Returns the origin requests are sent to.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolves an origin-relative path to an absolute URL.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Network(format!("invalid method {}: {e}", request.method)))?;
        let url = self.url_for(&request.key().to_string());

        let mut builder = self.client.request(method, &url);
        for (name, value) in request.headers.iter().filter(|(n, _)| !is_hop_by_hop(n)) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        log::trace!("{} {url} -> {status}", request.method);
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_for_joins_paths() {
        let net = HttpNetwork::with_client(reqwest::Client::new(), "https://example.com/");
        assert_eq!(net.origin(), "https://example.com");
        assert_eq!(net.url_for("/styles.css"), "https://example.com/styles.css");
        assert_eq!(net.url_for("app.js"), "https://example.com/app.js");
    }

    #[test]
    fn hop_by_hop_headers_are_detected() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("accept"));
    }

    #[tokio::test]
    async fn fetch_against_local_origin() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
                )
                .await
                .unwrap();
        });

        let net = HttpNetwork::new(format!("http://{addr}")).unwrap();
        let resp = net.fetch(&Request::get("/nope")).await.unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "missing");
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.header("connection"), None);
    }

    #[tokio::test]
    async fn fetch_forwards_method_headers_and_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received);
                if text.find("\r\n\r\n").is_some_and(|end| received.len() >= end + 4 + 10) {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
            let _ = tx.send(String::from_utf8_lossy(&received).to_string());
        });

        let net = HttpNetwork::new(format!("http://{addr}")).unwrap();
        let request = Request::new("POST", "/submit?x=1#ignored")
            .with_header("X-Custom", "yes")
            .with_header("Upgrade", "websocket")
            .with_body("name=value");
        let resp = net.fetch(&request).await.unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, "ok");

        let seen = rx.await.unwrap().to_ascii_lowercase();
        assert!(seen.starts_with("post /submit?x=1 http/1.1\r\n"));
        assert!(seen.contains("x-custom: yes\r\n"));
        assert!(!seen.contains("upgrade:"));
        assert!(seen.ends_with("\r\n\r\nname=value"));
    }

    #[tokio::test]
    async fn unreachable_origin_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let net = HttpNetwork::new(format!("http://{addr}")).unwrap();
        assert!(net.fetch(&Request::get("/")).await.is_err());
    }
}
