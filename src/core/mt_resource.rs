use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted value guarded by a read-write lock.
///
/// `MtResource` is how chunk grids and window columns are shared between the
/// recentre thread, the mesh workers and the render thread. Cloning it clones
/// the handle, never the value.
///
/// A panicking worker must not take the whole stream down with it, so lock
/// poisoning is ignored: the guard of a poisoned lock is handed out as-is.
///
/// # Type Parameters
/// - `T`: The type of the contained resource, must be `Send + Sync`
///
/// # Performance Considerations
/// - Read operations (`get()`) can occur concurrently
/// - Write operations (`get_mut()`) are exclusive and will block other operations
/// - Mesh workers only ever take read guards, so they never contend with each other
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    ///
    /// # Arguments
    /// * `resource` - The value to be stored in the resource
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read guard for the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a write guard for the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_the_value() {
        let counter = MtResource::new(0u32);
        let handle = counter.clone();

        thread::spawn(move || *handle.get_mut() += 1)
            .join()
            .unwrap();

        assert_eq!(*counter.get(), 1);
        assert!(counter.ptr_eq(&counter.clone()));
        assert!(!counter.ptr_eq(&MtResource::new(1)));
    }

    #[test]
    fn poisoned_lock_is_still_readable() {
        let value = MtResource::new(7u32);
        let handle = value.clone();

        let _ = thread::spawn(move || {
            let _guard = handle.get_mut();
            panic!("worker died while holding the lock");
        })
        .join();

        assert_eq!(*value.get(), 7);
    }
}
