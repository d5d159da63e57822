//! Fan-out of detection events to registered subscribers.
//! A subscriber that errors or panics is logged and skipped; the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::event::DetectionEvent;

/// Subscriber signature. Returning `Err` is logged, never propagated.
pub type DetectionCallback = Arc<dyn Fn(&DetectionEvent) -> Result<(), String> + Send + Sync>;

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Vec<(CallbackId, DetectionCallback)>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: DetectionCallback) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, callback));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Call every subscriber in registration order. Returns how many
    /// completed without error. The registry lock is not held while
    /// callbacks run, so they may register or unregister freely.
    pub fn dispatch(&self, event: &DetectionEvent) -> usize {
        let snapshot: Vec<(CallbackId, DetectionCallback)> = self.callbacks.read().clone();
        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(callback = id.0, phrase = %event.phrase, error = %e, "callback_failed");
                }
                Err(_) => {
                    warn!(callback = id.0, phrase = %event.phrase, "callback_panicked");
                }
            }
        }
        delivered
    }
}
