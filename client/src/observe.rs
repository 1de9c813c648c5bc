//! Store observers.
//!
//! Stores publish every cache mutation to registered observers. The
//! contract: observers are notified synchronously, before the mutating call
//! returns, so a view reading the store immediately after an event sees the
//! new state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tether_codec::RecordId;

/// A single cache mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<M> {
    /// A record was inserted or replaced.
    Upserted(M),
    /// A record was removed.
    Removed(RecordId),
}

/// Callback invoked for every store event.
pub type Observer<M> = Arc<dyn Fn(&StoreEvent<M>) + Send + Sync>;

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of observers for one store.
pub(crate) struct Observers<M> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ObserverId, Observer<M>)>>,
}

impl<M> Observers<M> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer, returning its handle.
    pub(crate) fn observe(&self, observer: Observer<M>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, observer));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub(crate) fn unobserve(&self, id: ObserverId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Notify every current observer, synchronously.
    pub(crate) fn emit(&self, event: &StoreEvent<M>) {
        let observers: Vec<Observer<M>> = self
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(event);
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Observer<M>)>> {
        // A poisoned registry only means a previous observer panicked; the
        // entries themselves are still coherent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
