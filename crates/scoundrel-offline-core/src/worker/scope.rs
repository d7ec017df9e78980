use std::sync::atomic::{AtomicBool, Ordering};

/// Control surface a worker sees while handling lifecycle events.
///
/// The worker only records its requests here; the host reads them once the
/// event has finished and acts on them.
#[derive(Debug, Default)]
pub struct WorkerScope {
    skip_waiting: AtomicBool,
    claim: AtomicBool,
}

impl WorkerScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate as soon as install succeeds instead of waiting for the
    /// previous version's clients to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Take control of every open client once activation finishes.
    pub fn claim_clients(&self) {
        self.claim.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn claim_requested(&self) -> bool {
        self.claim.load(Ordering::SeqCst)
    }
}
