pub mod atomic;
pub mod local;
pub mod locked;

use std::sync::Arc;

use likely_stable::likely;
use tracing::trace;

use crate::clock::Nanos;
use crate::config::BucketConfiguration;
use crate::state::BucketState;

/// The unit of publication: a configuration and the ledger it governs.
///
/// The configuration is shared between copies; only the ledger values are
/// copied.
#[derive(Debug, Clone)]
pub struct StateWithConfiguration {
    pub(crate) configuration: Arc<BucketConfiguration>,
    pub(crate) state: BucketState,
}

impl StateWithConfiguration {
    pub(crate) fn new(configuration: Arc<BucketConfiguration>, now: u64) -> Self {
        let state = BucketState::new(configuration.bandwidths(), now);
        Self {
            configuration,
            state,
        }
    }

    pub(crate) fn copy_from(&mut self, other: &StateWithConfiguration) {
        if !Arc::ptr_eq(&self.configuration, &other.configuration) {
            self.configuration = Arc::clone(&other.configuration);
        }
        self.state.copy_from(&other.state);
    }

    /// Swaps the configuration and leaves the ledger as it is. Balances above
    /// a smaller capacity are capped by the next refill.
    pub(crate) fn reconfigure(&mut self, configuration: Arc<BucketConfiguration>) {
        self.configuration = configuration;
    }

    pub(crate) fn refill_all(&mut self, now: u64) {
        self.state
            .refill_all(self.configuration.bandwidths(), now);
    }

    pub(crate) fn available_tokens(&self) -> i64 {
        self.state.available_tokens()
    }

    pub(crate) fn consume(&mut self, tokens: i64) {
        self.state.consume(tokens);
    }

    pub(crate) fn add_tokens(&mut self, tokens: i64) {
        self.state.add_tokens(self.configuration.bandwidths(), tokens);
    }

    pub(crate) fn delay_nanos_until_available(&self, tokens: i64) -> Nanos {
        self.state
            .delay_nanos_until_available(self.configuration.bandwidths(), tokens)
    }
}

/// Storage policy abstraction used by [`TokenBucket`](crate::TokenBucket).
///
/// Holds the single reference to the published [`StateWithConfiguration`].
/// The published value is never mutated; writers publish a fresh value with
/// [`compare_and_swap`](Self::compare_and_swap). Implementations decide how
/// that swap is synchronized.
pub trait StateStorage: crate::private::Sealed {
    /// Create a new storage policy publishing the provided state.
    fn new(state: Arc<StateWithConfiguration>) -> Self;
    /// Load the currently published state.
    fn load(&self) -> Arc<StateWithConfiguration>;
    /// Publish `new` if `current` is still the published state. Otherwise
    /// return the state that is.
    fn compare_and_swap(
        &self,
        current: &Arc<StateWithConfiguration>,
        new: Arc<StateWithConfiguration>,
    ) -> Result<(), Arc<StateWithConfiguration>>;
}

/// The outcome of running an operation against a working copy.
pub(crate) enum Decision<R> {
    /// Publish the working copy, then return the value.
    Commit(R),
    /// Return the value, leaving the published state untouched.
    Skip(R),
}

/// Runs bucket operations as optimistic read-copy-compute-commit loops over a
/// [`StateStorage`].
#[derive(Debug)]
pub(crate) struct BucketStorage<S> {
    inner: S,
}

impl<S: StateStorage> BucketStorage<S> {
    pub fn new(configuration: Arc<BucketConfiguration>, now: u64) -> Self {
        let state = StateWithConfiguration::new(configuration, now);
        Self {
            inner: S::new(Arc::new(state)),
        }
    }

    pub fn load(&self) -> Arc<StateWithConfiguration> {
        self.inner.load()
    }

    #[cfg(test)]
    pub(crate) fn strategy(&self) -> &S {
        &self.inner
    }

    /// The decision is given a working copy refilled to `now` and may mutate
    /// it. Committed copies are published with a compare-and-swap; when that
    /// loses a race the working copy is overwritten in place with the winner's
    /// state, refilled again and the decision re-run.
    pub fn update<R, F>(&self, now: u64, mut decide: F) -> R
    where
        F: FnMut(&mut StateWithConfiguration) -> Decision<R>,
    {
        let mut previous = self.inner.load();
        let mut work = Arc::new(StateWithConfiguration::clone(&previous));
        let mut attempt: u32 = 0;
        loop {
            // unique again once a failed swap has dropped its handle, so this
            // does not allocate
            let state = Arc::make_mut(&mut work);
            state.refill_all(now);
            let result = match decide(state) {
                Decision::Skip(result) => return result,
                Decision::Commit(result) => result,
            };
            match self.inner.compare_and_swap(&previous, Arc::clone(&work)) {
                Ok(()) if likely(attempt == 0) => return result,
                Ok(()) => {
                    trace!(attempt, "published bucket state after retries");
                    return result;
                }
                Err(actual) => {
                    attempt = attempt.saturating_add(1);
                    trace!(attempt, "lost the race to publish bucket state, retrying");
                    Arc::make_mut(&mut work).copy_from(&actual);
                    previous = actual;
                }
            }
        }
    }
}
