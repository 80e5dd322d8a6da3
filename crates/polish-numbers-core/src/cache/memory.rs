use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheBucket, CacheStorage, CachedData, EntryInfo};
use crate::error::Result;
use crate::models::{Request, RequestKey, Response};

/// In-process cache storage. Contents live as long as the storage value.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, Arc<MemoryBucket>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        let mut buckets = self.buckets.write().await;
        let bucket: Arc<dyn CacheBucket> = buckets.entry(name.to_string()).or_default().clone();
        Ok(bucket)
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(name)
            .map(|b| b.clone() as Arc<dyn CacheBucket>))
    }
}

#[derive(Default)]
pub struct MemoryBucket {
    entries: RwLock<BTreeMap<RequestKey, CachedData<Response>>>,
}

#[async_trait]
impl CacheBucket for MemoryBucket {
    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&request.key()).map(|c| c.data.clone()))
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<()> {
        // One write lock for the whole batch: readers see all or nothing
        let mut stored = self.entries.write().await;
        for (request, response) in entries {
            stored.insert(request.key(), CachedData::new(response));
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<EntryInfo>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .map(|(key, cached)| EntryInfo {
                key: key.clone(),
                status: cached.data.status,
                size: cached.data.body.len(),
                cached_at: cached.cached_at,
            })
            .collect())
    }
}
