//! Activation: drop stale cache namespaces, then claim open pages.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::clients::Clients;
use crate::registration::ServiceWorkerId;

/// Every namespace except `current`.
pub fn stale_namespaces<'a>(
    names: impl IntoIterator<Item = &'a str>,
    current: &str,
) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| *name != current)
        .map(str::to_string)
        .collect()
}

/// What an activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Namespaces removed.
    pub deleted: Vec<String>,
    /// Namespaces that could not be removed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Clients that now have this worker as controller.
    pub claimed: Vec<String>,
}

pub struct Activator {
    cache_name: String,
    caches: Arc<dyn CacheStore>,
    clients: Arc<RwLock<Clients>>,
}

impl Activator {
    pub fn new(
        cache_name: &str,
        caches: Arc<dyn CacheStore>,
        clients: Arc<RwLock<Clients>>,
    ) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            caches,
            clients,
        }
    }

    /// Delete every namespace other than the current one, then claim every
    /// window in `scope` for `worker`.
    ///
    /// Running it again deletes nothing and claims nothing new.
    pub async fn run(&self, worker: ServiceWorkerId, scope: &Url) -> ActivationReport {
        info!(cache = %self.cache_name, "Service worker activating");

        let names = self.caches.list_namespaces().await;
        let stale = stale_namespaces(names.iter().map(String::as_str), &self.cache_name);

        let results = join_all(stale.into_iter().map(|name| async move {
            let result = self.caches.delete_namespace(&name).await;
            (name, result)
        }))
        .await;

        let mut report = ActivationReport::default();
        for (name, result) in results {
            match result {
                Ok(true) => {
                    info!(cache = %name, "Deleted old cache");
                    report.deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete old cache");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report.claimed = self.clients.write().await.claim(worker, scope);
        report
    }
}
