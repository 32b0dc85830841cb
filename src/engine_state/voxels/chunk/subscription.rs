//! Change notifications fired by a chunk when its blocks are edited.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::engine_state::voxels::coords::ChunkIndex;

/// Callback invoked with the index of the chunk that changed.
pub type ChangeCallback = Arc<dyn Fn(ChunkIndex) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: Vec<(u64, ChangeCallback)>,
}

/// The set of callbacks subscribed to one chunk.
#[derive(Default)]
pub struct ChangeListeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl ChangeListeners {
    /// Adds a callback. It stays registered until the returned guard is dropped.
    pub fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.push((id, callback));

        Subscription {
            table: Arc::downgrade(&self.table),
            id,
        }
    }

    /// Calls every subscribed callback.
    ///
    /// The table lock is released before the callbacks run, so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, index: ChunkIndex) {
        let callbacks: Vec<ChangeCallback> = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .listeners
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect()
        };

        for callback in callbacks {
            callback(index);
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Returns `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a change callback registered; unsubscribes on drop.
pub struct Subscription {
    table: Weak<Mutex<ListenerTable>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dropping_the_guard_unsubscribes() {
        let listeners = ChangeListeners::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let subscription = listeners.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.notify(Point3::new(0, 0, 0));
        assert_eq!(listeners.len(), 1);

        drop(subscription);
        listeners.notify(Point3::new(0, 0, 0));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn guard_outliving_the_chunk_is_harmless() {
        let listeners = ChangeListeners::default();
        let subscription = listeners.subscribe(Arc::new(|_| {}));

        drop(listeners);
        drop(subscription);
    }
}
