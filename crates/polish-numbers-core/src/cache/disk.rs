use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{CacheBucket, CacheStorage, CachedData, EntryInfo};
use crate::error::{Error, Result};
use crate::models::{Request, RequestKey, Response};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";
const STAGING_EXT: &str = "tmp";

/// Cache storage rooted at a directory, one subdirectory per bucket.
pub struct DiskStorage {
    root: PathBuf,
    buckets: Mutex<HashMap<String, Arc<DiskBucket>>>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid cache name: {:?}", name),
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        let path = self.bucket_path(name)?;
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get(name) {
            return Ok(bucket.clone() as Arc<dyn CacheBucket>);
        }
        tokio::fs::create_dir_all(&path).await?;
        let bucket = Arc::new(DiskBucket::new(path));
        buckets.insert(name.to_string(), bucket.clone());
        Ok(bucket as Arc<dyn CacheBucket>)
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        let path = self.bucket_path(name)?;
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get(name) {
            return Ok(Some(bucket.clone() as Arc<dyn CacheBucket>));
        }
        // Buckets created by an earlier process are picked up from disk
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let bucket = Arc::new(DiskBucket::new(path));
        buckets.insert(name.to_string(), bucket.clone());
        Ok(Some(bucket as Arc<dyn CacheBucket>))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    size: usize,
}

/// Readers share `lock`; `put_all` holds it exclusively while committing, so a
/// reader never pairs one version's metadata with another version's body.
pub struct DiskBucket {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl DiskBucket {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: RwLock::new(()),
        }
    }

    /// SHA-256 of the key in hex: a fixed-length, filesystem-safe name for any URL.
    fn file_stem(key: &RequestKey) -> String {
        Sha256::digest(key.as_str().as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn entry_path(&self, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, ext))
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut staged = path.as_os_str().to_owned();
        staged.push(".");
        staged.push(STAGING_EXT);
        PathBuf::from(staged)
    }

    async fn load_meta(path: &Path) -> Result<Option<CachedData<EntryMeta>>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write every entry to staging files. Returns (staged, final) path pairs,
    /// body before metadata for each entry.
    async fn stage(
        &self,
        entries: &[(Request, Response)],
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<()> {
        for (request, response) in entries {
            let key = request.key();
            let stem = Self::file_stem(&key);

            let body_path = self.entry_path(&stem, BODY_EXT);
            let body_staging = Self::staging_path(&body_path);
            tokio::fs::write(&body_staging, &response.body).await?;
            staged.push((body_staging, body_path));

            let meta = CachedData::new(EntryMeta {
                key,
                status: response.status,
                headers: response.headers.clone(),
                size: response.body.len(),
            });
            let meta_path = self.entry_path(&stem, META_EXT);
            let meta_staging = Self::staging_path(&meta_path);
            tokio::fs::write(&meta_staging, serde_json::to_string_pretty(&meta)?).await?;
            staged.push((meta_staging, meta_path));
        }
        Ok(())
    }

    async fn discard(staged: &[(PathBuf, PathBuf)]) {
        for (staging, _) in staged {
            if let Err(e) = tokio::fs::remove_file(staging).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %e, "Failed to remove staged cache file");
                }
            }
        }
    }
}

#[async_trait]
impl CacheBucket for DiskBucket {
    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let _guard = self.lock.read().await;

        let key = request.key();
        let stem = Self::file_stem(&key);
        let Some(meta) = Self::load_meta(&self.entry_path(&stem, META_EXT)).await? else {
            return Ok(None);
        };
        if meta.data.key != key {
            debug!(stored = %meta.data.key, requested = %key, "Cache file holds another key");
            return Ok(None);
        }

        let body = match tokio::fs::read(self.entry_path(&stem, BODY_EXT)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %meta.data.key, "Cache metadata without body, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Response {
            status: meta.data.status,
            headers: meta.data.headers,
            body,
        }))
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<()> {
        let _guard = self.lock.write().await;

        let mut staged = Vec::with_capacity(entries.len() * 2);
        if let Err(e) = self.stage(&entries, &mut staged).await {
            warn!(error = %e, "Failed to stage cache entries, discarding batch");
            Self::discard(&staged).await;
            return Err(e);
        }

        for (i, (staging, path)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(staging, path).await {
                warn!(path = %path.display(), error = %e, "Failed to commit cache entry");
                Self::discard(&staged[i..]).await;
                return Err(e.into());
            }
        }

        debug!(dir = %self.dir.display(), count = entries.len(), "Stored cache entries");
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<EntryInfo>> {
        let _guard = self.lock.read().await;
        let mut infos = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(meta) = Self::load_meta(&path).await? {
                infos.push(EntryInfo {
                    key: meta.data.key,
                    status: meta.data.status,
                    size: meta.data.size,
                    cached_at: meta.cached_at,
                });
            }
        }
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn audio(n: u32) -> (Request, Response) {
        (
            Request::get(format!("/audio/{}.mp3", n)),
            Response::new(200, vec![n as u8; 16]).with_header("Content-Type", "audio/mpeg"),
        )
    }

    #[test]
    fn test_file_stem_is_sha256_hex() {
        let key = Request::get("/").key();
        assert_eq!(
            DiskBucket::file_stem(&key),
            "c767025d0edc7a064cf0003cc4d5a2f5f9e013c608f7a6909554afcdb1126fb2"
        );

        let long = Request::get(format!("/audio/1.mp3?session={}", "a".repeat(300))).key();
        assert_eq!(DiskBucket::file_stem(&long).len(), 64);
    }

    #[tokio::test]
    async fn test_long_urls_miss_and_hit() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.open("polish-numbers-cache").await.unwrap();
        let url = format!("/audio/1.mp3?session={}", "a".repeat(250));

        assert!(bucket.match_request(&Request::get(url.as_str())).await.unwrap().is_none());

        bucket
            .put_all(vec![(Request::get(url.as_str()), Response::new(200, "long"))])
            .await
            .unwrap();
        let hit = bucket.match_request(&Request::get(url.as_str())).await.unwrap();
        assert_eq!(hit, Some(Response::new(200, "long")));
        assert_eq!(bucket.keys().await.unwrap()[0].url(), url);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_mix_versions() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.open("polish-numbers-cache").await.unwrap();

        // The ETag header always names the body it was stored with
        let version = |v: &str| {
            vec![(
                Request::get("/index.html"),
                Response::new(200, v.to_string()).with_header("ETag", v),
            )]
        };
        bucket.put_all(version("v0")).await.unwrap();

        let writer = {
            let bucket = bucket.clone();
            tokio::spawn(async move {
                for i in 1..=50 {
                    bucket.put_all(version(&format!("v{}", i))).await.unwrap();
                }
            })
        };
        let reader = {
            let bucket = bucket.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let response = bucket
                        .match_request(&Request::get("/index.html"))
                        .await
                        .unwrap()
                        .unwrap();
                    assert_eq!(response.header("etag").unwrap().as_bytes(), &response.body[..]);
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.bucket_path("../escape").is_err());
        assert!(storage.bucket_path("").is_err());
        assert!(storage.bucket_path("polish-numbers-cache").is_ok());
    }

    #[tokio::test]
    async fn test_round_trip_keeps_status_headers_body() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.open("polish-numbers-cache").await.unwrap();

        let (request, response) = audio(7);
        bucket
            .put_all(vec![(request.clone(), response.clone())])
            .await
            .unwrap();

        let hit = bucket.match_request(&request).await.unwrap();
        assert_eq!(hit, Some(response));
        assert!(bucket
            .match_request(&Request::get("/audio/8.mp3"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
            let bucket = storage.open("polish-numbers-cache").await.unwrap();
            bucket.put_all(vec![audio(1), audio(2)]).await.unwrap();
        }

        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.get("polish-numbers-cache").await.unwrap().unwrap();
        let keys = bucket.keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].as_str(), "GET /audio/1.mp3");
        assert_eq!(keys[1].as_str(), "GET /audio/2.mp3");
    }

    #[tokio::test]
    async fn test_get_missing_bucket_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.get("polish-numbers-cache").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.open("polish-numbers-cache").await.unwrap();

        // A directory squatting on a staging path makes the second write fail
        let (blocked, _) = audio(2);
        let stem = DiskBucket::file_stem(&blocked.key());
        let bucket_dir = dir.path().join("polish-numbers-cache");
        std::fs::create_dir(bucket_dir.join(format!("{}.body.tmp", stem))).unwrap();

        let result = bucket.put_all(vec![audio(1), audio(2)]).await;
        assert!(result.is_err());
        assert!(bucket.entries().await.unwrap().is_empty());
        assert!(bucket
            .match_request(&Request::get("/audio/1.mp3"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_entries_report_size_and_status() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let bucket = storage.open("polish-numbers-cache").await.unwrap();
        bucket
            .put_all(vec![(Request::get("/"), Response::new(200, "<html></html>"))])
            .await
            .unwrap();

        let entries = bucket.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, 200);
        assert_eq!(entries[0].size, 13);
        assert_eq!(entries[0].age_display(), "just now");
    }
}
