//! Worker configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::manifest::{StaticManifest, CACHE_NAME};
use crate::notifications::{NotificationAction, NotificationOptions};
use crate::ServiceWorkerError;

/// Origin used when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Service worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceWorkerConfig {
    /// Name of the current cache namespace
    pub cache_name: String,

    /// Origin the worker is registered for; manifest paths resolve against it
    pub origin: Url,

    /// Resources pre-cached at install
    pub manifest: StaticManifest,

    /// Document served to navigations while offline
    pub offline_document: String,

    /// Window opened by the "view" notification action
    pub app_root: String,

    /// Background sync tag this worker answers to
    pub sync_tag: String,

    /// Push notification presentation
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Title when the push payload has none
    pub default_title: String,

    /// Body when the push payload has none
    pub default_body: String,

    pub icon: String,

    pub badge: String,

    pub tag: String,

    /// Keep the notification up until the user acts on it
    pub require_interaction: bool,

    pub actions: Vec<NotificationAction>,
}

impl Default for ServiceWorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is a valid URL"),
            manifest: StaticManifest::default(),
            offline_document: "/index.html".to_string(),
            app_root: "/".to_string(),
            sync_tag: "background-sync".to_string(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "AI Tools Hub".to_string(),
            default_body: "New AI tools available!".to_string(),
            icon: "/icon-192.png".to_string(),
            badge: "/badge-72.png".to_string(),
            tag: "ai-tools-notification".to_string(),
            require_interaction: true,
            actions: vec![
                NotificationAction::new("view", "View Tools", "/action-view.png"),
                NotificationAction::new("close", "Close", "/action-close.png"),
            ],
        }
    }
}

impl NotificationConfig {
    /// Options for a notification with the given body.
    pub fn options(&self, body: String) -> NotificationOptions {
        NotificationOptions {
            body,
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            tag: self.tag.clone(),
            require_interaction: self.require_interaction,
            actions: self.actions.clone(),
        }
    }
}

impl ServiceWorkerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ServiceWorkerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ServiceWorkerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ServiceWorkerError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ServiceWorkerError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if self.cache_name.trim().is_empty() {
            return Err(ServiceWorkerError::ConfigError(
                "cache_name must not be empty".to_string(),
            ));
        }
        if !toolshub_net::is_network_scheme(&self.origin) {
            return Err(ServiceWorkerError::ConfigError(format!(
                "origin must be http or https, got {}",
                self.origin
            )));
        }
        if self.manifest.required.is_empty() {
            return Err(ServiceWorkerError::ConfigError(
                "manifest needs at least one required resource".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a path or URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::ConfigError(format!("bad path '{path}': {e}")))
    }

    /// Scope controlled by the worker: the root of its origin.
    pub fn scope(&self) -> Url {
        let mut scope = self.origin.clone();
        scope.set_path("/");
        scope.set_query(None);
        scope.set_fragment(None);
        scope
    }
}
