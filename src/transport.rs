//! Network transport abstraction
//!
//! The core never speaks HTTP itself. It hands a [`Request`] to a
//! [`Transport`] and gets a [`Response`] or a network error back. Timeouts
//! belong to the transport; the core adds none.

use crate::config::schema::TransportConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::http::{Request, Response, ResponseType};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use ureq::ResponseExt;
use url::Url;

/// Fetch-capable network layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request.
    ///
    /// Any HTTP status is a successful fetch; only connectivity, DNS, TLS or
    /// timeout failures are errors.
    async fn fetch(&self, request: &Request) -> OfflineResult<Response>;
}

/// Blocking `ureq` client driven from tokio's blocking pool
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    origin: Url,
    user_agent: String,
}

impl UreqTransport {
    /// Create a transport for an application origin.
    ///
    /// Responses whose final URL is on `origin` are classified `basic`,
    /// anything else `cors`.
    pub fn new(origin: Url, config: &TransportConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout_secs.map(Duration::from_secs))
            .build()
            .into();

        Self {
            agent,
            origin,
            user_agent: config.user_agent.clone(),
        }
    }

    fn classify(&self, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }

    fn fetch_blocking(&self, request: &Request) -> OfflineResult<Response> {
        let url = request.url.as_str();

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(url)
            .header("User-Agent", self.user_agent.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(())
            .map_err(|e| OfflineError::invalid_url(url, e))?;

        let mut response = self
            .agent
            .run(http_request)
            .map_err(|e| OfflineError::network(url, e.to_string()))?;

        let final_url = Url::parse(&response.get_uri().to_string()).unwrap_or_else(|_| request.url.clone());
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| OfflineError::network(url, format!("reading body: {}", e)))?;

        debug!("Fetched {} -> {} ({} bytes)", url, status, body.len());

        Ok(Response {
            response_type: self.classify(&final_url),
            url: final_url,
            status,
            headers,
            body: Bytes::from(body),
        })
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn fetch(&self, request: &Request) -> OfflineResult<Response> {
        let transport = self.clone();
        let request = request.clone();
        let url = request.url.to_string();

        tokio::task::spawn_blocking(move || transport.fetch_blocking(&request))
            .await
            .map_err(|e| OfflineError::network(url, format!("fetch task failed: {}", e)))?
    }
}
