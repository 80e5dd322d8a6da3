//! polish-numbers-core - offline asset cache for the polish-numbers page.
//!
//! On install the worker fetches a fixed list of page assets and audio files
//! into a named cache bucket, all or nothing. Afterwards every resource load
//! is answered from that bucket when possible and from the network otherwise.
//!
//! ```no_run
//! use std::sync::Arc;
//! use polish_numbers_core::{DiskStorage, HttpNetwork, OfflineCacheManager, Request, ServiceWorker};
//!
//! # async fn example() -> polish_numbers_core::Result<()> {
//! let storage = Arc::new(DiskStorage::new("/tmp/polish-numbers".into())?);
//! let network = Arc::new(HttpNetwork::new("http://127.0.0.1:5000")?);
//! let worker = ServiceWorker::new(OfflineCacheManager::new(storage, network));
//!
//! worker.install().await?;
//! let served = worker.handle_fetch(Request::get("/audio/1.mp3")).await?;
//! println!("{} bytes from {}", served.response.body.len(), served.source);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod host;
pub mod manifest;
pub mod models;
pub mod network;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheBucket, CacheStorage, CachedData, DiskStorage, EntryInfo, MemoryStorage};
pub use error::{Error, Result};
pub use host::{FetchEvent, InstallEvent, ServiceWorker, WorkerState};
pub use manifest::{AssetManifest, CACHE_NAME};
pub use models::{Request, RequestKey, Response};
pub use network::{HttpNetwork, Network};
pub use worker::{OfflineCacheManager, Served, Source};
