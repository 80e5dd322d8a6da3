//! Network access for cache misses and install-time fetches.
//!
//! `Network` is the seam the worker forwards requests through. `HttpNetwork`
//! implements it with `reqwest`, resolving page-relative URLs against the
//! configured origin.

pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Request, Response};

pub use client::HttpNetwork;

#[async_trait]
pub trait Network: Send + Sync {
    /// Send the request and return whatever response comes back, error
    /// statuses included. Only transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
