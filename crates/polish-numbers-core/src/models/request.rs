use std::fmt;

use serde::{Deserialize, Serialize};

/// An outgoing resource load intercepted from the controlled page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Identity of this request for cache lookups.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity: upper-cased method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self(format!(
            "{} {}",
            method.to_ascii_uppercase(),
            Self::normalize_url(url)
        ))
    }

    /// Fragments never reach the network, so they never distinguish entries.
    fn normalize_url(url: &str) -> &str {
        let url = url.split('#').next().unwrap_or_default();
        if url.is_empty() {
            "/"
        } else {
            url
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &str {
        self.0.split_once(' ').map(|(m, _)| m).unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.0.split_once(' ').map(|(_, u)| u).unwrap_or_default()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
