use crate::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Holds at most one instance of `T`, created on first access.
///
/// Initialization runs under the registry's lock, so concurrent first callers
/// still produce a single instance. A failed initialization leaves the slot
/// empty and the next caller tries again.
#[derive(Debug)]
pub struct ProducerRegistry<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Default for ProducerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProducerRegistry<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the existing instance, or stores and returns the result of `init`.
    ///
    /// `init` is not called when an instance already exists.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let instance = Arc::new(init()?);
        *slot = Some(Arc::clone(&instance));
        Ok(instance)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.lock().as_ref().map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    // A panic inside `init` poisons the lock without ever storing a value.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
