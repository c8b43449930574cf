//! Worker versions and their registration lifecycle.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use url::Url;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Initial state, script being parsed.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Script URL.
    pub script_url: Url,

    /// Cache namespace this version owns.
    pub cache_name: String,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new service worker.
    pub fn new(script_url: Url, cache_name: &str) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            script_url,
            cache_name: cache_name.to_string(),
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }
}

/// Service worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A new version started installing.
    UpdateFound { worker_id: ServiceWorkerId },
    /// A client is now controlled by a different worker.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
    /// A stale cache namespace was deleted during activation.
    CacheDeleted { name: String },
}

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,

    /// The waiting worker asked to skip the waiting phase.
    pub skip_waiting_requested: bool,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
            skip_waiting_requested: false,
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }

    /// Start installing a new version. Returns its id.
    ///
    /// A version still installing from an earlier update becomes redundant.
    pub fn update(&mut self, script_url: Url, cache_name: &str) -> ServiceWorkerId {
        if let Some(mut previous) = self.installing.take() {
            previous.set_state(ServiceWorkerState::Redundant);
        }
        let mut worker = ServiceWorker::new(script_url, cache_name);
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        self.installing = Some(worker);
        self.skip_waiting_requested = false;
        id
    }

    /// Transition installing to waiting.
    pub fn install_complete(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.installing.take()?;
        worker.set_state(ServiceWorkerState::Installed);
        if let Some(mut superseded) = self.waiting.replace(worker) {
            superseded.set_state(ServiceWorkerState::Redundant);
        }
        self.waiting.as_ref().map(|w| w.id)
    }

    /// Discard the installing worker. The active one keeps running.
    pub fn install_failed(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.installing.take()?;
        worker.set_state(ServiceWorkerState::Redundant);
        Some(worker.id)
    }

    /// Ask for the waiting worker to activate without waiting for old clients.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting_requested = true;
    }

    /// Whether the waiting worker may activate now.
    pub fn ready_to_activate(&self) -> bool {
        self.waiting.is_some() && (self.skip_waiting_requested || self.active.is_none())
    }

    /// Promote the waiting worker to activating; the old active becomes redundant.
    pub fn begin_activation(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.waiting.take()?;
        worker.set_state(ServiceWorkerState::Activating);

        if let Some(mut old) = self.active.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }

        let id = worker.id;
        self.active = Some(worker);
        self.skip_waiting_requested = false;
        Some(id)
    }

    /// Mark the activating worker as activated.
    pub fn finish_activation(&mut self) -> Option<ServiceWorkerId> {
        let worker = self
            .active
            .as_mut()
            .filter(|w| w.state == ServiceWorkerState::Activating)?;
        worker.set_state(ServiceWorkerState::Activated);
        Some(worker.id)
    }

    /// Reinstate a version that was activated in an earlier session.
    pub fn restore_active(&mut self, script_url: Url, cache_name: &str) -> ServiceWorkerId {
        let mut worker = ServiceWorker::new(script_url, cache_name);
        worker.set_state(ServiceWorkerState::Activated);
        let id = worker.id;
        if let Some(mut old) = self.active.replace(worker) {
            old.set_state(ServiceWorkerState::Redundant);
        }
        id
    }

    /// Unregister (mark as inactive).
    pub fn unregister(&mut self) {
        let workers = [
            self.active.take(),
            self.waiting.take(),
            self.installing.take(),
        ];
        for mut worker in workers.into_iter().flatten() {
            worker.set_state(ServiceWorkerState::Redundant);
        }
    }
}
