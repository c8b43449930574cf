//! The worker as a host runtime sees it: lifecycle plus event dispatch.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use toolshub_net::Fetcher;
use tracing::{debug, info, warn};
use url::Url;

use crate::activate::{ActivationReport, Activator};
use crate::cache::CacheStore;
use crate::clients::{Client, Clients};
use crate::config::ServiceWorkerConfig;
use crate::events::{self, NotificationClickEvent, PushEvent, SyncEvent, SyncOutcome};
use crate::fetch::{FetchEvent, FetchHandler, FetchOutcome};
use crate::install::{InstallReport, Installer};
use crate::notifications::NotificationHost;
use crate::registration::{
    ServiceWorkerEvent, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState,
};
use crate::strategy::BypassReason;
use crate::ServiceWorkerError;

/// One registered worker and the services it runs against.
pub struct ServiceWorkerHost {
    config: Arc<ServiceWorkerConfig>,

    caches: Arc<dyn CacheStore>,

    fetcher: Arc<dyn Fetcher>,

    /// Pages the worker may control.
    clients: Arc<RwLock<Clients>>,

    notifications: Arc<dyn NotificationHost>,

    registration: RwLock<ServiceWorkerRegistration>,

    fetch_handler: FetchHandler,

    /// Event sender for state changes.
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerHost {
    /// Create a host. Lifecycle events arrive on the returned receiver.
    pub fn new(
        config: ServiceWorkerConfig,
        caches: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        notifications: Arc<dyn NotificationHost>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>), ServiceWorkerError> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let fetch_handler = FetchHandler::new(&config, caches.clone(), fetcher.clone())?;
        let registration = ServiceWorkerRegistration::new(config.scope());

        Ok((
            Self {
                config: Arc::new(config),
                caches,
                fetcher,
                clients: Arc::new(RwLock::new(Clients::new())),
                notifications,
                registration: RwLock::new(registration),
                fetch_handler,
                event_tx,
            },
            event_rx,
        ))
    }

    pub fn config(&self) -> &ServiceWorkerConfig {
        &self.config
    }

    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    /// Id and state of the active worker, if any.
    pub async fn active_worker(&self) -> Option<(ServiceWorkerId, ServiceWorkerState)> {
        self.registration
            .read()
            .await
            .get_active()
            .map(|w| (w.id, w.state))
    }

    /// Id of the worker waiting to activate, if any.
    pub async fn waiting_worker(&self) -> Option<ServiceWorkerId> {
        self.registration.read().await.waiting.as_ref().map(|w| w.id)
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    fn emit_state(&self, worker_id: ServiceWorkerId, new_state: ServiceWorkerState) {
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state,
        });
    }

    // ==================== Lifecycle ====================

    /// Install a new version from `script_url`.
    ///
    /// On success the version waits with skip-waiting requested. On failure it
    /// becomes redundant and any active version keeps serving.
    pub async fn install(&self, script_url: Url) -> Result<InstallReport, ServiceWorkerError> {
        let worker_id = self
            .registration
            .write()
            .await
            .update(script_url, &self.config.cache_name);
        self.emit(ServiceWorkerEvent::UpdateFound { worker_id });
        self.emit_state(worker_id, ServiceWorkerState::Installing);

        let installer = Installer::new(
            Arc::clone(&self.config),
            Arc::clone(&self.caches),
            Arc::clone(&self.fetcher),
        );

        match installer.run().await {
            Ok(report) => {
                let mut registration = self.registration.write().await;
                if let Some(id) = registration.install_complete() {
                    registration.skip_waiting();
                    self.emit_state(id, ServiceWorkerState::Installed);
                }
                info!(
                    cache = %report.cache_name,
                    required = report.required.len(),
                    best_effort = report.best_effort_cached.len(),
                    "Service worker installed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Service worker install failed");
                if let Some(id) = self.registration.write().await.install_failed() {
                    self.emit_state(id, ServiceWorkerState::Redundant);
                }
                Err(e)
            }
        }
    }

    /// Activate the waiting version, or rerun cleanup for the active one.
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        let (worker_id, scope) = {
            let mut registration = self.registration.write().await;
            let previous = registration.get_active().map(|w| w.id);

            match registration.begin_activation() {
                Some(id) => {
                    if let Some(old) = previous {
                        self.emit_state(old, ServiceWorkerState::Redundant);
                    }
                    self.emit_state(id, ServiceWorkerState::Activating);
                    (id, registration.scope.clone())
                }
                None => {
                    let active = registration.get_active().ok_or_else(|| {
                        ServiceWorkerError::StateError("No worker to activate".to_string())
                    })?;
                    (active.id, registration.scope.clone())
                }
            }
        };

        let activator = Activator::new(
            &self.config.cache_name,
            Arc::clone(&self.caches),
            Arc::clone(&self.clients),
        );
        let report = activator.run(worker_id, &scope).await;

        if let Some(id) = self.registration.write().await.finish_activation() {
            self.emit_state(id, ServiceWorkerState::Activated);
            info!(cache = %self.config.cache_name, "Service worker activated");
        }
        for name in &report.deleted {
            self.emit(ServiceWorkerEvent::CacheDeleted { name: name.clone() });
        }
        for client_id in &report.claimed {
            self.emit(ServiceWorkerEvent::ControllerChange {
                client_id: client_id.clone(),
                worker_id,
            });
        }

        Ok(report)
    }

    /// Install, then activate if the new version is allowed to take over.
    pub async fn start(
        &self,
        script_url: Url,
    ) -> Result<(InstallReport, Option<ActivationReport>), ServiceWorkerError> {
        let install = self.install(script_url).await?;

        let ready = self.registration.read().await.ready_to_activate();
        if !ready {
            debug!("New version waiting for existing clients to close");
            return Ok((install, None));
        }
        let activation = self.activate().await?;
        Ok((install, Some(activation)))
    }

    /// Pick up a version whose namespace survived from an earlier session,
    /// without installing again. Returns `false` if there is none.
    pub async fn resume(&self, script_url: Url) -> bool {
        if !self.caches.has(&self.config.cache_name).await {
            return false;
        }
        let id = self
            .registration
            .write()
            .await
            .restore_active(script_url, &self.config.cache_name);
        self.emit_state(id, ServiceWorkerState::Activated);
        debug!(cache = %self.config.cache_name, "Resumed cached version");
        true
    }

    // ==================== Functional events ====================

    /// Dispatch a fetch. Without an activated worker nothing is intercepted.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> FetchOutcome {
        let controlling = matches!(
            self.active_worker().await,
            Some((_, ServiceWorkerState::Activated))
        );
        if !controlling {
            return FetchOutcome::PassThrough(BypassReason::NoActiveWorker);
        }
        self.fetch_handler.handle(event).await
    }

    pub fn handle_sync(&self, event: &SyncEvent) -> SyncOutcome {
        events::handle_sync(event, &self.config.sync_tag)
    }

    /// Show the notification a push asks for. Returns whether one was shown.
    pub async fn handle_push(&self, event: &PushEvent) -> Result<bool, ServiceWorkerError> {
        let Some((title, options)) = event.notification(&self.config.notifications)? else {
            debug!("Push without payload");
            return Ok(false);
        };

        info!(title = %title, "Push notification received");
        self.notifications.show_notification(&title, options).await?;
        Ok(true)
    }

    /// Dismiss the clicked notification; the "view" action also brings up
    /// the app root window, which is returned.
    pub async fn handle_notification_click(
        &self,
        event: &NotificationClickEvent,
    ) -> Result<Option<Client>, ServiceWorkerError> {
        self.notifications.close_notification(&event.tag).await;

        if !event.opens_app() {
            return Ok(None);
        }
        let app_root = self.config.resolve(&self.config.app_root)?;
        let client = self.clients.write().await.open_window(app_root)?;
        debug!(client = %client.id, url = %client.url, "Opened app window");
        Ok(Some(client))
    }

    /// Wait for pending cache write-backs.
    pub async fn settle(&self) {
        self.fetch_handler.settle().await;
    }
}
