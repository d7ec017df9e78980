//! Worker host: registration, lifecycle dispatch and client control.
//!
//! The host plays the part of the environment a worker runs in. Workers are
//! registered explicitly; each lifecycle event is spawned as a task and the
//! host holds its `EventHandle` until the handler resolves.
//!
//! Registration follows the usual update flow:
//!
//! ```text
//! register ─▶ installing ─┬─▶ installed ─▶ (skip_waiting or no active) ─▶ activating ─▶ activated
//!                         └─▶ redundant (install failed, previous version keeps serving)
//! ```

pub mod event;
pub mod state;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{Request, Response, ResponseSource};
use crate::network::Network;
use crate::worker::{FetchOutcome, ServiceWorker, WorkerError, WorkerScope};

pub use event::{dispatch_activate, dispatch_fetch, dispatch_install, EventHandle};
pub use state::WorkerState;

/// An open page under the host's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// What a client receives for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResponse {
    /// Answered by the controlling worker.
    Worker {
        response: Response,
        source: ResponseSource,
    },
    /// Not intercepted; fetched directly.
    Network(Response),
    /// The worker had nothing to serve offline.
    Unavailable,
}

impl HostResponse {
    pub fn response(&self) -> Option<&Response> {
        match self {
            HostResponse::Worker { response, .. } | HostResponse::Network(response) => Some(response),
            HostResponse::Unavailable => None,
        }
    }
}

struct RegisteredWorker {
    worker: Arc<dyn ServiceWorker>,
    scope: Arc<WorkerScope>,
    state: WorkerState,
}

#[derive(Default)]
struct Registration {
    workers: HashMap<String, RegisteredWorker>,
    active: Option<String>,
    waiting: Option<String>,
    /// Client → controlling version
    clients: BTreeMap<ClientId, Option<String>>,
}

impl Registration {
    fn set_state(&mut self, version: &str, state: WorkerState) {
        if let Some(registered) = self.workers.get_mut(version) {
            debug!(version = version, from = %registered.state, to = %state, "Worker state change");
            registered.state = state;
            if state == WorkerState::Redundant {
                registered.worker.retire();
            }
        }
    }
}

pub struct WorkerHost {
    network: Arc<dyn Network>,
    registration: Mutex<Registration>,
    next_client: AtomicU64,
}

impl WorkerHost {
    /// `network` serves requests no worker intercepts.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            registration: Mutex::new(Registration::default()),
            next_client: AtomicU64::new(1),
        }
    }

    /// Register a worker version and run it through install and, when
    /// allowed, activation. Returns the state the worker ended in.
    ///
    /// Registering the version that is already active is a no-op.
    pub async fn register(&self, worker: Arc<dyn ServiceWorker>) -> Result<WorkerState, WorkerError> {
        let version = worker.version().to_string();
        let scope = Arc::new(WorkerScope::new());

        {
            let mut reg = self.registration.lock().await;
            if reg.active.as_deref() == Some(version.as_str()) {
                debug!(version = %version, "Version already active");
                return Ok(WorkerState::Activated);
            }
            reg.workers.insert(
                version.clone(),
                RegisteredWorker {
                    worker: worker.clone(),
                    scope: scope.clone(),
                    state: WorkerState::Parsed,
                },
            );
            reg.set_state(&version, WorkerState::Installing);
        }

        info!(version = %version, "Installing worker");
        if let Err(e) = dispatch_install(worker, scope.clone()).wait().await {
            let mut reg = self.registration.lock().await;
            reg.set_state(&version, WorkerState::Redundant);
            error!(version = %version, error = %e, "Install failed, keeping previous version");
            return Err(e);
        }

        let activate_now = {
            let mut reg = self.registration.lock().await;
            reg.set_state(&version, WorkerState::Installed);
            let activate_now = scope.skip_waiting_requested() || reg.active.is_none();
            if !activate_now {
                if let Some(previous) = reg.waiting.replace(version.clone()) {
                    if previous != version {
                        reg.set_state(&previous, WorkerState::Redundant);
                    }
                }
            }
            activate_now
        };

        if !activate_now {
            info!(version = %version, "Installed, waiting for clients to close");
            return Ok(WorkerState::Installed);
        }
        self.activate(&version).await
    }

    /// Activate an installed version, replacing the active one.
    async fn activate(&self, version: &str) -> Result<WorkerState, WorkerError> {
        let (worker, scope) = {
            let mut reg = self.registration.lock().await;
            let Some(registered) = reg.workers.get(version) else {
                return Err(WorkerError::UnknownVersion(version.to_string()));
            };
            let handles = (registered.worker.clone(), registered.scope.clone());

            if let Some(previous) = reg.active.take() {
                if previous != version {
                    reg.set_state(&previous, WorkerState::Redundant);
                }
            }
            if reg.waiting.as_deref() == Some(version) {
                reg.waiting = None;
            }
            reg.active = Some(version.to_string());
            reg.set_state(version, WorkerState::Activating);
            handles
        };

        info!(version = version, "Activating worker");
        // A failed activate handler does not stop the version from taking over.
        if let Err(e) = dispatch_activate(worker, scope.clone()).wait().await {
            warn!(version = version, error = %e, "Activate handler failed");
        }

        let mut reg = self.registration.lock().await;
        reg.set_state(version, WorkerState::Activated);
        if scope.claim_requested() {
            let count = reg.clients.len();
            for controller in reg.clients.values_mut() {
                *controller = Some(version.to_string());
            }
            debug!(version = version, clients = count, "Claimed clients");
        }
        Ok(WorkerState::Activated)
    }

    /// Open a page; it is controlled by the version active right now.
    pub async fn open_client(&self) -> ClientId {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        let mut reg = self.registration.lock().await;
        let controller = reg.active.clone();
        reg.clients.insert(id, controller);
        id
    }

    /// Close a page. When no open page is controlled by the active version
    /// any more, a waiting version is activated.
    pub async fn close_client(&self, client: ClientId) -> Result<(), WorkerError> {
        let waiting = {
            let mut reg = self.registration.lock().await;
            reg.clients.remove(&client);
            let active = reg.active.clone();
            let still_controlled = active.is_some()
                && reg.clients.values().any(|controller| *controller == active);
            if still_controlled {
                None
            } else {
                reg.waiting.clone()
            }
        };

        if let Some(version) = waiting {
            self.activate(&version).await?;
        }
        Ok(())
    }

    pub async fn controller(&self, client: ClientId) -> Option<String> {
        let reg = self.registration.lock().await;
        reg.clients.get(&client).cloned().flatten()
    }

    pub async fn active_version(&self) -> Option<String> {
        self.registration.lock().await.active.clone()
    }

    pub async fn waiting_version(&self) -> Option<String> {
        self.registration.lock().await.waiting.clone()
    }

    pub async fn state(&self, version: &str) -> Option<WorkerState> {
        let reg = self.registration.lock().await;
        reg.workers.get(version).map(|r| r.state)
    }

    /// Route a request from `client` through its controlling worker.
    pub async fn fetch(&self, client: ClientId, request: Request) -> Result<HostResponse, WorkerError> {
        let worker = {
            let reg = self.registration.lock().await;
            reg.clients
                .get(&client)
                .cloned()
                .flatten()
                .and_then(|version| reg.workers.get(&version))
                .filter(|registered| registered.state.can_intercept_fetch())
                .map(|registered| registered.worker.clone())
        };

        let Some(worker) = worker else {
            return self.fetch_direct(&request).await;
        };

        match dispatch_fetch(worker, request.clone()).wait().await? {
            FetchOutcome::Passthrough => self.fetch_direct(&request).await,
            FetchOutcome::Respond { response, source } => Ok(HostResponse::Worker { response, source }),
            FetchOutcome::Unavailable => Ok(HostResponse::Unavailable),
        }
    }

    async fn fetch_direct(&self, request: &Request) -> Result<HostResponse, WorkerError> {
        let response = self.network.fetch(request).await?;
        Ok(HostResponse::Network(response))
    }
}
