//! The offline cache manager: install-time population and per-request interception.

use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::cache::CacheStorage;
use crate::error::{Error, Result};
use crate::manifest::{AssetManifest, CACHE_NAME};
use crate::models::{Request, Response};
use crate::network::Network;

/// Where an intercepted request was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Cache => f.write_str("cache"),
            Source::Network => f.write_str("network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

/// Owns one named cache bucket, filled from the asset manifest on install and
/// read on every intercepted request.
pub struct OfflineCacheManager {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    cache_name: String,
    manifest: AssetManifest,
}

impl OfflineCacheManager {
    /// Manager for the polish-numbers page: `polish-numbers-cache` and the
    /// 24-entry asset manifest.
    pub fn new(storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            cache_name: CACHE_NAME.to_string(),
            manifest: AssetManifest::polish_numbers(),
        }
    }

    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// True when the bucket exists and holds an entry for every manifest URL.
    pub async fn is_populated(&self) -> Result<bool> {
        let Some(bucket) = self.storage.get(&self.cache_name).await? else {
            return Ok(false);
        };
        for request in self.manifest.requests()? {
            if bucket.match_request(&request).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fetch every manifest URL and store the responses as one batch.
    ///
    /// Any transport failure or non-2xx status fails the whole step before
    /// anything is written, so a failed populate adds no entries.
    pub async fn populate(&self) -> Result<()> {
        let requests = self.manifest.requests()?;
        let bucket = self.storage.open(&self.cache_name).await?;

        info!(cache = %self.cache_name, assets = requests.len(), "Populating offline cache");

        let fetches = requests.into_iter().map(|request| async move {
            let response = self.network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(Error::from_status(
                    &request.url,
                    response.status,
                    &String::from_utf8_lossy(&response.body),
                ));
            }
            Ok::<_, Error>((request, response))
        });
        let entries = try_join_all(fetches).await?;

        bucket.put_all(entries).await?;
        info!(cache = %self.cache_name, "Offline cache populated");
        Ok(())
    }

    /// Answer a request from the cache, or from the network on a miss.
    pub async fn intercept(&self, request: &Request) -> Result<Response> {
        self.serve(request).await.map(|served| served.response)
    }

    /// Like `intercept`, also reporting where the response came from.
    /// Network responses are returned as-is and never stored.
    pub async fn serve(&self, request: &Request) -> Result<Served> {
        if let Some(response) = self.lookup(request).await? {
            debug!(url = %request.url, "Cache hit");
            return Ok(Served {
                response,
                source: Source::Cache,
            });
        }

        debug!(method = %request.method, url = %request.url, "Cache miss, forwarding to network");
        let response = self.network.fetch(request).await?;
        Ok(Served {
            response,
            source: Source::Network,
        })
    }

    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        // Only GET requests are ever stored
        if !request.is_get() {
            return Ok(None);
        }
        match self.storage.get(&self.cache_name).await? {
            Some(bucket) => bucket.match_request(request).await,
            None => Ok(None),
        }
    }
}
