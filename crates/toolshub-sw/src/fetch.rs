//! Fetch interception: cache first, then network, then offline substitution.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use toolshub_net::{Fetcher, Request, Response};
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::config::ServiceWorkerConfig;
use crate::strategy::{self, BypassReason, Fallback, Interception};
use crate::ServiceWorkerError;

/// A fetch event.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The intercepted request.
    pub request: Request,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self { request }
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Network failed; the cached offline document was served.
    OfflineDocument,
    /// Network failed; the synthetic 408 was served.
    OfflinePlaceholder,
}

/// Result of dispatching a fetch event.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request as if no worker existed.
    PassThrough(BypassReason),
    /// The worker answered.
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::PassThrough(_) => None,
            Self::Respond { response, .. } => Some(response),
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            Self::PassThrough(_) => None,
            Self::Respond { source, .. } => Some(*source),
        }
    }
}

/// Steady-state request handler of one worker version.
pub struct FetchHandler {
    cache_name: String,
    offline_document: Url,
    caches: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    write_backs: TaskTracker,
}

impl FetchHandler {
    pub fn new(
        config: &ServiceWorkerConfig,
        caches: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        Ok(Self {
            cache_name: config.cache_name.clone(),
            offline_document: config.resolve(&config.offline_document)?,
            caches,
            fetcher,
            write_backs: TaskTracker::new(),
        })
    }

    /// Handle one fetch event.
    ///
    /// Network failures never surface as errors; they become a fallback response.
    pub async fn handle(&self, event: &FetchEvent) -> FetchOutcome {
        let request = &event.request;

        if let Interception::Bypass(reason) = strategy::classify_request(request) {
            trace!(url = %request.url, ?reason, "Not intercepting");
            return FetchOutcome::PassThrough(reason);
        }

        if let Some(cached) = self.caches.match_request(&self.cache_name, request).await {
            debug!(url = %request.url, "Serving from cache");
            return FetchOutcome::Respond {
                response: cached,
                source: ResponseSource::Cache,
            };
        }

        debug!(url = %request.url, "Fetching from network");
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if strategy::should_cache(&response) {
                    self.spawn_write_back(request.clone(), response.clone());
                }
                FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                }
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network request failed");
                self.fallback(request).await
            }
        }
    }

    async fn fallback(&self, request: &Request) -> FetchOutcome {
        if let Fallback::CachedDocument(document) =
            strategy::offline_fallback(request, &self.offline_document)
        {
            let lookup = Request::get(document);
            if let Some(response) = self.caches.match_request(&self.cache_name, &lookup).await {
                return FetchOutcome::Respond {
                    response,
                    source: ResponseSource::OfflineDocument,
                };
            }
            warn!(document = %lookup.url, "Offline document missing from cache");
        }

        FetchOutcome::Respond {
            response: strategy::offline_placeholder(),
            source: ResponseSource::OfflinePlaceholder,
        }
    }

    /// Store a network response in the background. The caller never waits on
    /// it; if the runtime goes away first the write is simply lost.
    fn spawn_write_back(&self, request: Request, response: Response) {
        let caches = Arc::clone(&self.caches);
        let cache_name = self.cache_name.clone();

        self.write_backs.spawn(async move {
            match caches.put(&cache_name, &request, &response).await {
                Ok(()) => trace!(url = %request.url, cache = %cache_name, "Cached network response"),
                Err(e) => warn!(url = %request.url, error = %e, "Cache write-back failed"),
            }
        });
    }

    /// Number of write-backs still running.
    pub fn pending_write_backs(&self) -> usize {
        self.write_backs.len()
    }

    /// Wait until every write-back started so far has finished.
    pub async fn settle(&self) {
        self.write_backs.close();
        self.write_backs.wait().await;
        self.write_backs.reopen();
    }
}
