use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::models::Request;
use crate::worker::{FetchOutcome, ServiceWorker, WorkerError, WorkerScope};

/// A dispatched lifecycle event.
///
/// The handler runs as its own task; holding the handle keeps the result
/// reachable until the host collects it with `wait`. Dropping the handle
/// detaches the task without cancelling it.
pub struct EventHandle<T> {
    event: &'static str,
    handle: JoinHandle<Result<T, WorkerError>>,
}

impl<T> EventHandle<T> {
    pub async fn wait(self) -> Result<T, WorkerError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::HandlerAborted {
                event: self.event,
                reason: e.to_string(),
            }),
        }
    }
}

pub fn dispatch_install(worker: Arc<dyn ServiceWorker>, scope: Arc<WorkerScope>) -> EventHandle<()> {
    EventHandle {
        event: "install",
        handle: tokio::spawn(async move { worker.install(&scope).await }),
    }
}

pub fn dispatch_activate(worker: Arc<dyn ServiceWorker>, scope: Arc<WorkerScope>) -> EventHandle<()> {
    EventHandle {
        event: "activate",
        handle: tokio::spawn(async move { worker.activate(&scope).await }),
    }
}

pub fn dispatch_fetch(worker: Arc<dyn ServiceWorker>, request: Request) -> EventHandle<FetchOutcome> {
    EventHandle {
        event: "fetch",
        handle: tokio::spawn(async move { worker.fetch(request).await }),
    }
}
