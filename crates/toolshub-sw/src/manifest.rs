//! The static pre-cache manifest.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Current cache namespace. Bump to invalidate everything cached so far.
pub const CACHE_NAME: &str = "ai-tools-hub-v1";

/// App shell files. Install fails unless every one of them is cached.
pub const REQUIRED_RESOURCES: [&str; 4] = ["/", "/index.html", "/css/style.css", "/js/script.js"];

/// External stylesheets. Cached when reachable, skipped otherwise.
pub const BEST_EFFORT_RESOURCES: [&str; 2] = [
    "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700;800&family=Space+Grotesk:wght@300;400;500;600;700&display=swap",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
];

/// Which tier a manifest entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestTier {
    Required,
    BestEffort,
}

/// Ordered list of resources to pre-cache at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticManifest {
    pub required: Vec<String>,
    pub best_effort: Vec<String>,
}

impl Default for StaticManifest {
    fn default() -> Self {
        Self {
            required: REQUIRED_RESOURCES.iter().map(|s| s.to_string()).collect(),
            best_effort: BEST_EFFORT_RESOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StaticManifest {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.required.len() + self.best_effort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve one tier against the worker's origin.
    pub fn resolve(&self, tier: ManifestTier, base: &Url) -> Result<Vec<Url>, ServiceWorkerError> {
        let entries = match tier {
            ManifestTier::Required => &self.required,
            ManifestTier::BestEffort => &self.best_effort,
        };
        entries
            .iter()
            .map(|entry| {
                base.join(entry).map_err(|e| {
                    ServiceWorkerError::ConfigError(format!("bad manifest entry '{entry}': {e}"))
                })
            })
            .collect()
    }
}
