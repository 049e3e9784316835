use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{StateStorage, StateWithConfiguration};

/// Mutex guarded implementation of [`StateStorage`].
///
/// Loads and swaps briefly take a lock around the reference. Useful as a
/// baseline to compare the lock-free [`AtomicStorage`](super::atomic::AtomicStorage)
/// against.
#[derive(Debug)]
pub struct LockedStorage(Mutex<Arc<StateWithConfiguration>>);

impl LockedStorage {
    fn lock(&self) -> MutexGuard<'_, Arc<StateWithConfiguration>> {
        // the guarded value is a single reference, never left half written
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl crate::private::Sealed for LockedStorage {}

impl StateStorage for LockedStorage {
    fn new(state: Arc<StateWithConfiguration>) -> Self {
        Self(Mutex::new(state))
    }

    fn load(&self) -> Arc<StateWithConfiguration> {
        Arc::clone(&self.lock())
    }

    fn compare_and_swap(
        &self,
        current: &Arc<StateWithConfiguration>,
        new: Arc<StateWithConfiguration>,
    ) -> Result<(), Arc<StateWithConfiguration>> {
        let mut published = self.lock();
        if Arc::ptr_eq(&published, current) {
            *published = new;
            Ok(())
        } else {
            Err(Arc::clone(&published))
        }
    }
}
