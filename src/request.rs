//! Request and response snapshots exchanged with the store and the network.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity under which a response is stored.
///
/// Path plus query string, with any fragment removed. An empty path is `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Builds a key from a path, stripping the fragment.
    #[must_use]
    pub fn new(path: &str) -> Self {
        let path = path.split_once('#').map_or(path, |(before, _)| before);
        if path.is_empty() {
            Self("/".to_string())
        } else if path.starts_with('?') {
            Self(format!("/{path}"))
        } else {
            Self(path.to_string())
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, upper case.
    pub method: String,
    /// Origin-relative path, optionally with query string.
    pub path: String,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Bytes,
}

impl Request {
    /// Creates a `GET` request for `path` with no headers or body.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the store identity of this request.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.path)
    }

    /// Whether this request can be answered from the store.
    ///
    /// Only `GET` requests are matched.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }
}

/// A response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
