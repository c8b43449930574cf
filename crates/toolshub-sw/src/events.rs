//! Background sync, push and notification-click events.
//!
//! None of these carry caching logic. Push turns its payload into a
//! notification; a click on the "view" action opens the app root.

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::NotificationConfig;
use crate::notifications::NotificationOptions;
use crate::ServiceWorkerError;

/// Action id that opens the app from a notification.
pub const VIEW_ACTION: &str = "view";

// ==================== Sync ====================

/// A background sync event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tag: String,
}

impl SyncEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// What the worker did with a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The tag is ours. There is no queued work to replay yet.
    Handled,
    /// Unknown tag.
    Ignored,
}

/// Answer a sync event.
pub fn handle_sync(event: &SyncEvent, sync_tag: &str) -> SyncOutcome {
    if event.tag == sync_tag {
        info!(tag = %event.tag, "Background sync triggered");
        SyncOutcome::Handled
    } else {
        debug!(tag = %event.tag, "Ignoring unknown sync tag");
        SyncOutcome::Ignored
    }
}

// ==================== Push ====================

/// A push message, with its raw payload if it carried one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(default)]
    title: serde_json::Value,
    #[serde(default)]
    body: serde_json::Value,
}

impl PushEvent {
    /// A push without payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// Title and options of the notification this push should display.
    ///
    /// A push without payload displays nothing. A `title` or `body` that is
    /// absent, empty or not a string takes the configured default. A payload
    /// that is not a JSON object is rejected.
    pub fn notification(
        &self,
        config: &NotificationConfig,
    ) -> Result<Option<(String, NotificationOptions)>, ServiceWorkerError> {
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let payload: PushPayload = serde_json::from_slice(data)
            .map_err(|e| ServiceWorkerError::InvalidPayload(e.to_string()))?;

        let title = text_or(&payload.title, &config.default_title);
        let body = text_or(&payload.body, &config.default_body);
        Ok(Some((title, config.options(body))))
    }
}

fn text_or(value: &serde_json::Value, default: &str) -> String {
    match value.as_str() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

// ==================== Notification click ====================

/// The user clicked a notification or one of its actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClickEvent {
    /// Tag of the clicked notification.
    pub tag: String,
    /// Action button id; `None` for a click on the notification body.
    pub action: Option<String>,
}

impl NotificationClickEvent {
    pub fn new(tag: impl Into<String>, action: Option<&str>) -> Self {
        Self {
            tag: tag.into(),
            action: action.map(str::to_string),
        }
    }

    /// Whether the click should bring up the app.
    pub fn opens_app(&self) -> bool {
        self.action.as_deref() == Some(VIEW_ACTION)
    }
}
