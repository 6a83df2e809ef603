//! Task registry - live task ids and their cancellation handles
//!
//! The registry can only signal a stop; it never sees task state. Entries are
//! removed by the owning worker on its way out.

use super::task::TaskId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Narrow stop capability for one task.
///
/// `cancel` asks for a graceful stop; `kill` skips the grace periods.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    force: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop without waiting for the tool. Implies `cancel`.
    pub fn kill(&self) {
        self.token.cancel();
        self.force.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.force.is_cancelled()
    }

    /// Resolves once a stop was requested
    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves once a forced stop was requested
    pub(crate) async fn killed(&self) {
        self.force.cancelled().await
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    handles: Mutex<HashMap<TaskId, CancelHandle>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: TaskId, handle: CancelHandle) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles.insert(id, handle).is_some() {
            log::warn!("Task {} registered twice", id);
        }
    }

    pub fn deregister(&self, id: &TaskId) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles.remove(id).is_some() {
            log::debug!("Task {} deregistered", id);
        }
    }

    /// Signal a stop. `false` when the task is unknown or already finished.
    pub fn request_cancel(&self, id: &TaskId) -> bool {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        match handles.get(id) {
            Some(handle) => {
                log::info!("Cancelling task {}", id);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every live task; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.values() {
            handle.cancel();
        }
        handles.len()
    }

    /// Force-stop every live task; returns how many were signalled
    pub fn kill_all(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.values() {
            handle.kill();
        }
        handles.len()
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.contains_key(id)
    }

    pub fn running_ids(&self) -> Vec<TaskId> {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
