//! Named cache buckets mapping request identity to stored responses.
//!
//! This module provides the storage seam the worker is built on:
//! - `CacheStorage`: opens (create-if-absent) or looks up buckets by name
//! - `CacheBucket`: match, batch put, and listing of stored entries
//!
//! Two implementations are included. `MemoryStorage` keeps everything in a
//! `HashMap` and is used by tests and short-lived hosts. `DiskStorage` keeps
//! one directory per bucket so cached assets survive restarts.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Request, RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Summary of one stored entry, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: RequestKey,
    pub status: u16,
    pub size: usize,
    pub cached_at: DateTime<Utc>,
}

impl EntryInfo {
    pub fn age_display(&self) -> String {
        CachedData {
            data: (),
            cached_at: self.cached_at,
        }
        .age_display()
    }
}

#[async_trait]
pub trait CacheBucket: Send + Sync {
    /// Stored response for the request's identity, if any.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Store every entry or none of them. Existing entries with the same
    /// identity are replaced.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<()>;

    /// Stored entries sorted by key.
    async fn entries(&self) -> Result<Vec<EntryInfo>>;

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self.entries().await?.into_iter().map(|e| e.key).collect())
    }
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named bucket, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>>;

    /// The named bucket if it has been created.
    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>>;
}
