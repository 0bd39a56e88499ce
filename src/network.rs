//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::error::{Error, Result};
use crate::request::{CacheMode, Request, Response};

/// Abstraction over the network fetch primitive.
///
/// A transport failure is an `Err`; any HTTP status, including errors,
/// is a successful fetch returning a [`Response`].
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Builds a configured HTTP client for asset requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Default network implementation using `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Creates a network with a preconfigured client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    /// Creates a network around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::network(&request.url, e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;

        log::debug!("{} {} -> {status}", request.method, request.url);
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
