//! The fixed asset list pre-cached on install.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::Request;

/// Name of the cache bucket holding the pre-cached assets.
pub const CACHE_NAME: &str = "polish-numbers-cache";

/// Page shell assets cached ahead of the audio files.
const SHELL_ASSETS: [&str; 4] = ["/", "/index.html", "/manifest.json", "/service-worker.js"];

/// Audio files are numbered 1 through this value.
const AUDIO_FILE_COUNT: u32 = 20;

/// Ordered list of URLs that must all be cached for an install to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    urls: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// The polish-numbers page: shell assets followed by `/audio/1.mp3` .. `/audio/20.mp3`.
    pub fn polish_numbers() -> Self {
        let audio = (1..=AUDIO_FILE_COUNT).map(|n| format!("/audio/{}.mp3", n));
        Self::new(SHELL_ASSETS.iter().map(|s| s.to_string()).chain(audio))
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// GET requests for every entry, in order. Two entries with the same
    /// request identity are rejected.
    pub fn requests(&self) -> Result<Vec<Request>> {
        let mut seen = HashSet::new();
        self.urls
            .iter()
            .map(|url| {
                let request = Request::get(url.as_str());
                if !seen.insert(request.key()) {
                    return Err(Error::DuplicateRequest(url.clone()));
                }
                Ok(request)
            })
            .collect()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::polish_numbers()
    }
}
