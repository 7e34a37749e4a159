//! Request and response snapshots exchanged with the transport and cache store
//!
//! These types are deliberately small: the core only needs method, URL and
//! destination on the way in, and status, type, headers and a body snapshot on
//! the way out.

use crate::error::{OfflineError, OfflineResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// What the requester intends to do with the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Full-page navigation
    Document,
    Script,
    Style,
    Image,
    Manifest,
    /// Programmatic fetch (XHR, `fetch()`, playlist downloads)
    #[default]
    Empty,
}

/// Outgoing request as seen by the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Build a GET request for an absolute URL
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            destination: Destination::Empty,
            headers: Vec::new(),
        }
    }

    /// Parse an absolute URL and build a GET request for it
    pub fn parse(url: &str) -> OfflineResult<Self> {
        let parsed = Url::parse(url).map_err(|e| OfflineError::invalid_url(url, e))?;
        Ok(Self::get(parsed))
    }

    /// Build a full-page navigation request
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Whether this request targets the given origin
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Response type, following the fetch-standard classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response with readable headers and body
    Basic,
    /// Cross-origin response permitted by CORS
    Cors,
    /// Cross-origin response without CORS, contents unreadable
    Opaque,
    /// Manual-redirect response, contents unreadable
    OpaqueRedirect,
    /// Network error or redirect failure
    Error,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Cors => write!(f, "cors"),
            Self::Opaque => write!(f, "opaque"),
            Self::OpaqueRedirect => write!(f, "opaqueredirect"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Response snapshot
///
/// Cloning is cheap: the body is reference-counted, so a clone is the
/// "second copy" handed to the cache while the first goes to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub response_type: ResponseType,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Build a same-origin response
    pub fn basic(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            response_type: ResponseType::Basic,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Only a 200 same-origin `basic` response may be persisted.
    ///
    /// Opaque, CORS, redirect-error and non-200 responses cannot be replayed
    /// safely and are never written to the dynamic cache.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }
}

/// Cache key: method plus URL with the fragment stripped
///
/// Header variance is ignored on purpose; two requests for the same URL map
/// to the same entry regardless of `Accept` or `Range`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    /// Key for a GET of the given URL
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }

    pub fn for_request(request: &Request) -> Self {
        let mut key = Self::get(&request.url);
        key.method = request.method.to_ascii_uppercase();
        key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
