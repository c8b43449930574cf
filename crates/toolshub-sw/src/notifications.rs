//! System notifications, as seen from the worker.
//!
//! Displaying a notification belongs to the host. The worker only builds the
//! payload and hands it to a [`NotificationHost`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::ServiceWorkerError;

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action id reported back on click.
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str, icon: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
            icon: Some(icon.to_string()),
        }
    }
}

/// Options passed along with a notification title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

/// A notification currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
    pub shown_at: u64,
}

/// The host's notification subsystem.
#[async_trait]
pub trait NotificationHost: Send + Sync {
    /// Display a notification.
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), ServiceWorkerError>;

    /// Dismiss the notification with `tag`. Returns whether one was open.
    async fn close_notification(&self, tag: &str) -> bool;
}

/// In-memory notification host.
///
/// A new notification replaces an open one with the same tag.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    open: RwLock<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently open, oldest first.
    pub async fn open_notifications(&self) -> Vec<Notification> {
        self.open.read().await.clone()
    }
}

#[async_trait]
impl NotificationHost for NotificationCenter {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), ServiceWorkerError> {
        debug!(title, tag = %options.tag, "Showing notification");
        let mut open = self.open.write().await;
        if !options.tag.is_empty() {
            open.retain(|n| n.options.tag != options.tag);
        }
        open.push(Notification {
            title: title.to_string(),
            options,
            shown_at: toolshub_common::unix_millis(),
        });
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> bool {
        let mut open = self.open.write().await;
        let before = open.len();
        open.retain(|n| n.options.tag != tag);
        open.len() != before
    }
}
