//! `Observable` (spec.md §4.5): notifies listeners synchronously after
//! every successful state change, in the order updates happened within
//! a tick. Listener failures are logged, never propagated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::process::TransferProcess;

/// A listener for transfer-process lifecycle events.
///
/// Returns `Err` to report a failure the `Observable` should log; it
/// never affects scheduling (spec.md §4.5, §7).
pub trait TransferProcessListener: Send + Sync {
    fn on_transition(&self, process: &TransferProcess) -> Result<(), String>;
}

struct Registration {
    id: u64,
    listener: Arc<dyn TransferProcessListener>,
}

#[derive(Default)]
pub struct Observable {
    listeners: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl Observable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an id that can later be passed to `unregister_listener`.
    pub fn register_listener(&self, listener: Arc<dyn TransferProcessListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap()
            .push(Registration { id, listener });
        id
    }

    pub fn unregister_listener(&self, id: u64) {
        self.listeners.write().unwrap().retain(|r| r.id != id);
    }

    /// Ambient observability accessor, not part of spec.md's `Observable`
    /// contract but useful for health reporting (SPEC_FULL.md §4.5).
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    /// `invokeForEach` semantics: call every listener in registration
    /// order, catching and logging individual failures.
    pub fn notify(&self, process: &TransferProcess) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap()
            .iter()
            .map(|r| r.listener.clone())
            .collect();
        for listener in listeners {
            if let Err(reason) = listener.on_transition(process) {
                warn!(
                    process_id = %process.id,
                    reason = %reason,
                    "transfer process listener failed"
                );
            }
        }
    }
}
