//! Install-time pre-caching.

use std::sync::Arc;

use futures::future::join_all;
use toolshub_net::{Fetcher, Request, Response};
use tracing::{info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::config::ServiceWorkerConfig;
use crate::manifest::ManifestTier;
use crate::ServiceWorkerError;

/// What an install stored.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub cache_name: String,
    /// Required resources, all cached.
    pub required: Vec<Url>,
    /// Best-effort resources that were cached.
    pub best_effort_cached: Vec<Url>,
    /// Best-effort resources that were skipped, with the reason.
    pub best_effort_failed: Vec<(Url, String)>,
}

/// Populates the current namespace from the static manifest.
pub struct Installer {
    config: Arc<ServiceWorkerConfig>,
    caches: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl Installer {
    pub fn new(
        config: Arc<ServiceWorkerConfig>,
        caches: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            caches,
            fetcher,
        }
    }

    /// Run the install step.
    ///
    /// Any required resource failing aborts the install. Best-effort
    /// resources are attempted independently and only logged on failure.
    pub async fn run(&self) -> Result<InstallReport, ServiceWorkerError> {
        info!(cache = %self.config.cache_name, "Service worker installing");

        let cache_name = &self.config.cache_name;
        self.caches.open(cache_name).await?;

        let manifest = &self.config.manifest;
        let required = manifest.resolve(ManifestTier::Required, &self.config.origin)?;
        let best_effort = manifest.resolve(ManifestTier::BestEffort, &self.config.origin)?;

        info!(count = required.len(), "Caching static assets");
        self.add_all(&required).await?;

        let attempts = join_all(best_effort.into_iter().map(|url| async move {
            let result = self.add(&url).await;
            (url, result)
        }))
        .await;

        let mut report = InstallReport {
            cache_name: cache_name.clone(),
            required,
            ..Default::default()
        };
        for (url, result) in attempts {
            match result {
                Ok(()) => report.best_effort_cached.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to cache optional resource");
                    report.best_effort_failed.push((url, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    fn request_for(&self, url: &Url) -> Request {
        Request::get(url.clone()).origin(self.config.origin.origin())
    }

    /// Fetch a resource, insisting on a 2xx status.
    async fn fetch_ok(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        let install_failed = |reason: String| ServiceWorkerError::InstallFailed {
            url: request.url.to_string(),
            reason,
        };

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| install_failed(e.to_string()))?;

        if !response.ok() {
            return Err(install_failed(format!("status {}", response.status)));
        }
        Ok(response)
    }

    async fn add(&self, url: &Url) -> Result<(), ServiceWorkerError> {
        let request = self.request_for(url);
        let response = self.fetch_ok(&request).await?;
        self.caches
            .put(&self.config.cache_name, &request, &response)
            .await
    }

    /// Fetch every URL first; store only if all of them succeeded.
    async fn add_all(&self, urls: &[Url]) -> Result<(), ServiceWorkerError> {
        let requests: Vec<Request> = urls.iter().map(|url| self.request_for(url)).collect();
        let responses = join_all(requests.iter().map(|request| self.fetch_ok(request))).await;

        let mut pairs = Vec::with_capacity(requests.len());
        for (request, response) in requests.into_iter().zip(responses) {
            pairs.push((request, response?));
        }

        self.caches
            .put_all(&self.config.cache_name, &pairs)
            .await
    }
}
