//! # Tools Hub Service Worker
//!
//! Offline service worker for the AI Tools Hub web app.
//!
//! ## Features
//!
//! - **Install**: pre-cache the app shell (all-or-nothing) plus best-effort CDN assets
//! - **Activate**: drop every cache namespace but the current version, claim open pages
//! - **Fetch**: cache-first interception with network fallback and offline substitution
//! - **Sync / Push / Notification click**: thin handlers over the host's notification and
//!   window APIs
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerHost
//!     ├── ServiceWorkerRegistration (installing / waiting / active)
//!     ├── Installer ──┐
//!     ├── Activator ──┼── CacheStore (namespaces) ── Cache ── RequestKey → CacheEntry
//!     ├── FetchHandler┘        │
//!     │       └── strategy (pure decisions)
//!     ├── Clients
//!     └── NotificationHost
//! ```
//!
//! Exactly one namespace, named by the configured version string, is current.
//! Bumping the version is the only way to invalidate cached content.

use thiserror::Error;
use toolshub_net::NetError;

pub mod activate;
pub mod cache;
pub mod clients;
pub mod config;
pub mod events;
pub mod fetch;
pub mod host;
pub mod install;
pub mod manifest;
pub mod notifications;
pub mod persist;
pub mod registration;
pub mod strategy;

pub use activate::{ActivationReport, Activator};
pub use cache::{Cache, CacheEntry, CacheStore, MemoryCacheStorage, RequestKey};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{NotificationConfig, ServiceWorkerConfig};
pub use events::{NotificationClickEvent, PushEvent, SyncEvent, SyncOutcome};
pub use fetch::{FetchEvent, FetchHandler, FetchOutcome, ResponseSource};
pub use host::ServiceWorkerHost;
pub use install::{InstallReport, Installer};
pub use manifest::{ManifestTier, StaticManifest};
pub use notifications::{
    Notification, NotificationAction, NotificationCenter, NotificationHost, NotificationOptions,
};
pub use persist::CacheSnapshot;
pub use registration::{
    ServiceWorker, ServiceWorkerEvent, ServiceWorkerId, ServiceWorkerRegistration,
    ServiceWorkerState,
};
pub use strategy::{BypassReason, Fallback, Interception};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<NetError> for ServiceWorkerError {
    fn from(error: NetError) -> Self {
        Self::NetworkError(error.to_string())
    }
}
