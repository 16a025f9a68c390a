//! Per-call mutual exclusion
//!
//! Start, stop and segment appends for one call run under that call's lock.
//! There is no lock spanning calls.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::call::CallId;

#[derive(Default)]
pub struct CallLocks {
    entries: Mutex<HashMap<CallId, Arc<Mutex<()>>>>,
}

/// Proof that the holder has exclusive control of one call
pub struct CallGuard {
    call_id: CallId,
    _guard: OwnedMutexGuard<()>,
}

impl CallGuard {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }
}

impl CallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, call_id: CallId) -> CallGuard {
        let entry = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(call_id).or_default())
        };

        CallGuard {
            call_id,
            _guard: entry.lock_owned().await,
        }
    }

    /// Drop the entry of a call that reached a terminal state.
    ///
    /// Entries still held or awaited are kept.
    pub async fn release(&self, call_id: &CallId) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(call_id) {
            if Arc::strong_count(entry) == 1 {
                entries.remove(call_id);
                debug!("Released lock entry for call {}", call_id);
            }
        }
    }

    /// Drop `guard`, then forget the entry when the call is over
    pub async fn unlock(&self, guard: CallGuard, call_over: bool) {
        let call_id = guard.call_id;
        drop(guard);
        if call_over {
            self.release(&call_id).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
