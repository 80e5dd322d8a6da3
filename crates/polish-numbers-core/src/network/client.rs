//! HTTP implementation of `Network` backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use tracing::debug;

use super::Network;
use crate::error::{Error, Result};
use crate::models::{Request, Response};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Network client for the page's origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self> {
        let origin =
            Url::parse(origin).map_err(|e| Error::InvalidUrl(format!("{}: {}", origin, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a page-relative URL (`/audio/1.mp3`) against the origin.
    /// Absolute URLs are returned unchanged.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        self.origin
            .join(url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))
    }

    fn build_headers(request: &Request) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidRequest(format!("header {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidRequest(format!("header {}: {}", name, e)))?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(&request.url)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("method {:?}", request.method)))?;

        debug!(method = %method, url = %url, "Fetching from network");

        let response = self
            .client
            .request(method, url)
            .headers(Self::build_headers(request)?)
            .send()
            .await?;

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
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
