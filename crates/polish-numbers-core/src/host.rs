//! Service-worker style host: lifecycle state plus install/fetch event dispatch.
//!
//! The worker logic lives in `OfflineCacheManager`; this module only adapts
//! it to the two events a service-worker runtime emits:
//! - `install`: the handler extends the event with `wait_until` until the
//!   cache is populated; a failed install leaves the worker redundant
//! - `fetch`: the handler answers with `respond_with`; requests arriving
//!   while the worker is not active are not controlled and go to the network

use std::future::Future;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::Request;
use crate::worker::{OfflineCacheManager, Served, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activated,
    Redundant,
}

/// Dispatched once per install. Completion is deferred until every future
/// passed to `wait_until` resolves; any failure fails the install.
#[derive(Default)]
pub struct InstallEvent {
    extensions: Vec<BoxFuture<'static, Result<()>>>,
}

impl InstallEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_until<F>(&mut self, future: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.extensions.push(future.boxed());
    }

    async fn settle(self) -> Result<()> {
        try_join_all(self.extensions).await.map(|_| ())
    }
}

/// Dispatched once per resource load from a controlled page.
pub struct FetchEvent {
    request: Request,
    response: Option<BoxFuture<'static, Result<Served>>>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Answer the request with the given future. Only the first call counts.
    pub fn respond_with<F>(&mut self, future: F)
    where
        F: Future<Output = Result<Served>> + Send + 'static,
    {
        if self.response.is_none() {
            self.response = Some(future.boxed());
        }
    }
}

/// Install listener: hold the event open until the cache is populated.
pub fn on_install(manager: &Arc<OfflineCacheManager>, event: &mut InstallEvent) {
    let manager = manager.clone();
    event.wait_until(async move { manager.populate().await });
}

/// Fetch listener: answer from the cache, falling back to the network.
pub fn on_fetch(manager: &Arc<OfflineCacheManager>, event: &mut FetchEvent) {
    let manager = manager.clone();
    let request = event.request().clone();
    event.respond_with(async move { manager.serve(&request).await });
}

/// One registered worker and its lifecycle.
pub struct ServiceWorker {
    manager: Arc<OfflineCacheManager>,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(manager: OfflineCacheManager) -> Self {
        Self {
            manager: Arc::new(manager),
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub fn manager(&self) -> &Arc<OfflineCacheManager> {
        &self.manager
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Active and controlling requests.
    pub async fn is_ready(&self) -> bool {
        self.state().await == WorkerState::Activated
    }

    /// Run the install event and activate on success. A redundant worker may
    /// be installed again; an active one is left alone.
    pub async fn install(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                WorkerState::Activated => return Ok(()),
                WorkerState::Installing | WorkerState::Installed => {
                    return Err(Error::InstallInProgress);
                }
                WorkerState::Parsed | WorkerState::Redundant => *state = WorkerState::Installing,
            }
        }
        info!(cache = %self.manager.cache_name(), "Installing worker");

        let mut event = InstallEvent::new();
        on_install(&self.manager, &mut event);

        match event.settle().await {
            Ok(()) => {
                *self.state.write().await = WorkerState::Installed;
                self.activate().await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Install failed, worker is redundant");
                *self.state.write().await = WorkerState::Redundant;
                Err(Error::InstallFailed(Box::new(e)))
            }
        }
    }

    /// Pick up a worker installed by an earlier run: if the cache already
    /// holds the whole manifest, activate without fetching anything.
    pub async fn restore(&self) -> Result<bool> {
        if self.is_ready().await {
            return Ok(true);
        }
        if !self.manager.is_populated().await? {
            return Ok(false);
        }
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Parsed {
                return Ok(false);
            }
            *state = WorkerState::Installed;
        }
        self.activate().await;
        Ok(true)
    }

    async fn activate(&self) {
        // No activate listener is registered, so activation completes at once
        *self.state.write().await = WorkerState::Activated;
        info!(cache = %self.manager.cache_name(), "Worker activated");
    }

    /// Route one resource load. Only an active worker sees fetch events.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served> {
        if !self.is_ready().await {
            debug!(url = %request.url, "Worker not active, request is uncontrolled");
            return self.passthrough(&request).await;
        }

        let mut event = FetchEvent::new(request);
        on_fetch(&self.manager, &mut event);

        match event.response {
            Some(response) => response.await,
            None => self.passthrough(&event.request).await,
        }
    }

    async fn passthrough(&self, request: &Request) -> Result<Served> {
        let response = self.manager.network().fetch(request).await?;
        Ok(Served {
            response,
            source: Source::Network,
        })
    }
}
