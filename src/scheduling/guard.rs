//! Execution guard
//!
//! Serializes fetch runs process-wide: both scheduled and manual runs
//! must hold the permit, so at most one run is ever in flight.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Clonable handle to the single-run permit
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one run; released on drop
#[derive(Debug)]
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the permit without waiting
    ///
    /// `None` means a run is already in progress and the caller should
    /// skip, never queue.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunPermit { _guard: guard })
    }
}
