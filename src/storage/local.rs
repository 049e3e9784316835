use std::cell::RefCell;
use std::sync::Arc;

use super::{StateStorage, StateWithConfiguration};

/// Non synchronized implementation of [`StateStorage`]. This is intended for
/// single threaded scenarios and uses [`RefCell`] internally, so buckets
/// built on it are not [`Sync`].
#[derive(Debug)]
pub struct LocalStorage(RefCell<Arc<StateWithConfiguration>>);

impl crate::private::Sealed for LocalStorage {}

impl StateStorage for LocalStorage {
    fn new(state: Arc<StateWithConfiguration>) -> Self {
        Self(RefCell::new(state))
    }

    fn load(&self) -> Arc<StateWithConfiguration> {
        Arc::clone(&self.0.borrow())
    }

    fn compare_and_swap(
        &self,
        current: &Arc<StateWithConfiguration>,
        new: Arc<StateWithConfiguration>,
    ) -> Result<(), Arc<StateWithConfiguration>> {
        let mut published = self.0.borrow_mut();
        debug_assert!(Arc::ptr_eq(&published, current));
        *published = new;
        Ok(())
    }
}
