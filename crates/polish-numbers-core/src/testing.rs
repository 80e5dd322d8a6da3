//! Test doubles shared by the worker and host tests.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Request, Response};
use crate::network::Network;

/// Network fake answering from a fixed route table and recording every call.
/// Unknown URLs get a 404; URLs marked unreachable fail like a dropped connection.
#[derive(Default)]
pub struct FakeNetwork {
    routes: HashMap<String, Response>,
    unreachable: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Request>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every URL answers with a 200 whose body is the URL itself.
    pub fn serving<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut network = Self::new();
        for url in urls {
            let url = url.into();
            let body = url.clone();
            network.routes.insert(url, Response::new(200, body));
        }
        network
    }

    pub fn with_route(mut self, url: &str, response: Response) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    pub fn with_unreachable(self, url: &str) -> Self {
        self.set_unreachable(url, true);
        self
    }

    /// Take a URL offline or bring it back.
    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(url.to_string());
        } else {
            set.remove(url);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn last_call(&self) -> Option<Request> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.lock().unwrap().push(request.clone());
        if self.unreachable.lock().unwrap().contains(&request.url) {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::ConnectionRefused,
                format!("unreachable: {}", request.url),
            )));
        }
        Ok(self
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "Not Found")))
    }
}
