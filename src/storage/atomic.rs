use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use likely_stable::likely;

use super::{StateStorage, StateWithConfiguration};

/// Lock-free implementation of [`StateStorage`].
///
/// The published state lives behind an [`ArcSwap`]; loads never block and a
/// publish is a single compare-and-swap of the reference. A successful swap
/// happens-before every later load on any thread.
#[derive(Debug)]
pub struct AtomicStorage(ArcSwap<StateWithConfiguration>);

impl crate::private::Sealed for AtomicStorage {}

impl StateStorage for AtomicStorage {
    fn new(state: Arc<StateWithConfiguration>) -> Self {
        Self(ArcSwap::new(state))
    }

    fn load(&self) -> Arc<StateWithConfiguration> {
        self.0.load_full()
    }

    fn compare_and_swap(
        &self,
        current: &Arc<StateWithConfiguration>,
        new: Arc<StateWithConfiguration>,
    ) -> Result<(), Arc<StateWithConfiguration>> {
        let previous = self.0.compare_and_swap(current, new);
        if likely(Arc::ptr_eq(&*previous, current)) {
            Ok(())
        } else {
            Err(Guard::into_inner(previous))
        }
    }
}
