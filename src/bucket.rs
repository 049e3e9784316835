use std::fmt::{Debug, Formatter};
use std::num::NonZeroU64;
use std::sync::Arc;

use likely_stable::unlikely;
use tracing::{debug, warn};

use crate::clock::Nanos;
use crate::config::BucketConfiguration;
use crate::error::IncompatibleConfiguration;
use crate::probe::ConsumptionProbe;
use crate::state::BucketState;
use crate::storage::atomic::AtomicStorage;
use crate::storage::{BucketStorage, Decision, StateStorage, StateWithConfiguration};
use crate::{Clock, StdClock};

/// A token bucket that callers on any number of threads can query and
/// mutate without taking a lock, built on [`AtomicStorage`].
pub type LockFreeBucket<C = StdClock> = TokenBucket<AtomicStorage, C>;

/// A multi-bandwidth token bucket with configurable storage and clock
/// implementations.
///
/// Every operation reads the published state, refills a private copy to the
/// current time, decides, and publishes the copy with a single
/// compare-and-swap. A lost race re-reads the winner's state into the same
/// copy and decides again, so concurrent callers never double-spend and never
/// block each other. Operations take effect at their successful publish.
///
/// # Type Parameters
///
/// - `S`: Storage strategy (default: [`AtomicStorage`] for lock-free concurrent access)
/// - `C`: Clock implementation (default: [`StdClock`] for standard timing)
///
/// # Examples
///
/// ```rust
/// use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
/// use std::num::NonZeroU64;
///
/// let configuration = BucketConfiguration::builder()
///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()))
///     .build()
///     .unwrap();
/// let bucket = TokenBucket::new(configuration);
///
/// // Try to consume 5 tokens
/// if bucket.try_consume(NonZeroU64::new(5).unwrap()) {
///     println!("consumed 5 tokens, {} left", bucket.available_tokens());
/// }
/// ```
pub struct TokenBucket<S = AtomicStorage, C = StdClock> {
    storage: BucketStorage<S>,
    clock: C,
}

impl TokenBucket<AtomicStorage, StdClock> {
    /// Creates a new lock-free token bucket using the standard clock.
    pub fn new(configuration: BucketConfiguration) -> Self {
        TokenBucket::with_clock(configuration, StdClock::default())
    }
}

impl<C: Clock> TokenBucket<AtomicStorage, C> {
    /// Creates a new lock-free token bucket with a custom clock implementation.
    ///
    /// Use this when you need a specific timing source, such as `FastClock` for
    /// high-performance scenarios or [`ManualClock`](crate::ManualClock) for testing.
    pub fn with_clock(configuration: BucketConfiguration, clock: C) -> Self {
        Self::from_parts(configuration, clock)
    }
}

impl<S: StateStorage, C: Clock> TokenBucket<S, C> {
    /// Creates a token bucket from custom storage and clock implementations.
    ///
    /// Every bandwidth starts with its initial tokens at the clock's current
    /// time.
    pub fn from_parts(configuration: BucketConfiguration, clock: C) -> Self {
        let now = clock.now();
        Self {
            storage: BucketStorage::new(Arc::new(configuration), now),
            clock,
        }
    }

    /// Attempts to consume exactly the specified number of tokens.
    ///
    /// Returns `true` if every bandwidth held enough tokens, in which case
    /// they are consumed from all of them. Otherwise nothing changes.
    ///
    /// For wait time estimates when tokens are unavailable, use
    /// [`try_consume_and_return_remaining`](Self::try_consume_and_return_remaining).
    pub fn try_consume(&self, tokens: impl Into<NonZeroU64>) -> bool {
        let tokens = as_balance(tokens.into());
        let now = self.clock.now();
        self.storage.update(now, |state| {
            if tokens > state.available_tokens() {
                return Decision::Skip(false);
            }
            state.consume(tokens);
            Decision::Commit(true)
        })
    }

    /// Consumes up to `limit` tokens, returning how many were actually
    /// consumed. Zero when the bucket is empty or in debt.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
    /// use std::num::NonZeroU64;
    ///
    /// let configuration = BucketConfiguration::builder()
    ///     .add_limit(Bandwidth::per_minute(NonZeroU64::new(10).unwrap()))
    ///     .build()
    ///     .unwrap();
    /// let bucket = TokenBucket::new(configuration);
    ///
    /// // Request 100 tokens, but only get what's available
    /// assert_eq!(10, bucket.try_consume_as_much_as_possible(NonZeroU64::new(100).unwrap()));
    /// ```
    pub fn try_consume_as_much_as_possible(&self, limit: impl Into<NonZeroU64>) -> u64 {
        let limit = as_balance(limit.into());
        let now = self.clock.now();
        self.storage.update(now, |state| {
            let to_consume = limit.min(state.available_tokens());
            if to_consume <= 0 {
                return Decision::Skip(0);
            }
            state.consume(to_consume);
            Decision::Commit(to_consume.unsigned_abs())
        })
    }

    /// Attempts to consume tokens, reporting what is left and, on rejection,
    /// how long until the same request could succeed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
    /// use std::num::NonZeroU64;
    ///
    /// let configuration = BucketConfiguration::builder()
    ///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()))
    ///     .build()
    ///     .unwrap();
    /// let bucket = TokenBucket::new(configuration);
    ///
    /// let probe = bucket.try_consume_and_return_remaining(NonZeroU64::new(5).unwrap());
    /// if probe.is_consumed() {
    ///     println!("{} tokens left", probe.remaining_tokens());
    /// } else {
    ///     println!("retry in {}", probe.nanos_to_wait_for_refill());
    /// }
    /// ```
    pub fn try_consume_and_return_remaining(
        &self,
        tokens: impl Into<NonZeroU64>,
    ) -> ConsumptionProbe {
        let tokens = as_balance(tokens.into());
        let now = self.clock.now();
        self.storage.update(now, |state| {
            let available = state.available_tokens();
            if tokens > available {
                let wait = state.delay_nanos_until_available(tokens);
                return Decision::Skip(ConsumptionProbe::rejected(available, wait));
            }
            state.consume(tokens);
            Decision::Commit(ConsumptionProbe::consumed(available - tokens))
        })
    }

    /// Reserves tokens by borrowing from future refill.
    ///
    /// Returns how long the caller must wait before the reserved tokens are
    /// really available:
    ///
    /// * [`Nanos::ZERO`] - the tokens were available and are consumed.
    /// * A finite delay no longer than `max_wait` - the tokens are consumed,
    ///   leaving the bucket in debt until refill repays it.
    /// * [`Nanos::INFINITE`] - the wait would exceed `max_wait` or can never
    ///   end; nothing is consumed.
    ///
    /// The bucket never sleeps itself. A committed reservation cannot be
    /// undone other than by [`add_tokens`](Self::add_tokens).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
    /// use std::num::NonZeroU64;
    /// use std::time::Duration;
    ///
    /// let configuration = BucketConfiguration::builder()
    ///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()).with_initial_tokens(0))
    ///     .build()
    ///     .unwrap();
    /// let bucket = TokenBucket::new(configuration);
    ///
    /// let five = NonZeroU64::new(5).unwrap();
    /// let wait = bucket.reserve_and_calculate_time_to_sleep(five, Duration::from_secs(1));
    /// if let Some(wait) = wait.as_duration() {
    ///     std::thread::sleep(wait);
    /// }
    /// ```
    pub fn reserve_and_calculate_time_to_sleep(
        &self,
        tokens: impl Into<NonZeroU64>,
        max_wait: impl Into<Nanos>,
    ) -> Nanos {
        let tokens = as_balance(tokens.into());
        let max_wait = max_wait.into();
        let now = self.clock.now();
        let delay = self.storage.update(now, |state| {
            let delay = state.delay_nanos_until_available(tokens);
            if delay.is_zero() {
                state.consume(tokens);
                return Decision::Commit(Nanos::ZERO);
            }
            if delay.is_infinite() || delay > max_wait {
                return Decision::Skip(Nanos::INFINITE);
            }
            state.consume(tokens);
            Decision::Commit(delay)
        });
        if unlikely(!delay.is_zero() && !delay.is_infinite()) {
            debug!(tokens, %delay, "reserved tokens ahead of refill");
        }
        delay
    }

    /// Adds tokens to every bandwidth, capped at each capacity.
    ///
    /// Useful for returning tokens from cancelled operations or repaying a
    /// reservation that will not be used.
    pub fn add_tokens(&self, tokens: impl Into<NonZeroU64>) {
        let tokens = as_balance(tokens.into());
        let now = self.clock.now();
        self.storage.update(now, |state| {
            state.add_tokens(tokens);
            Decision::Commit(())
        })
    }

    /// Replaces the configuration while keeping the current token balances.
    ///
    /// The new configuration must be compatible with the one published at the
    /// time of the swap, see [`BucketConfiguration::check_compatibility`].
    /// Otherwise the bucket is left untouched and the incompatibility is
    /// returned.
    pub fn replace_configuration(
        &self,
        configuration: BucketConfiguration,
    ) -> Result<(), IncompatibleConfiguration> {
        let configuration = Arc::new(configuration);
        let now = self.clock.now();
        let result = self.storage.update(now, |state| {
            match state.configuration.check_compatibility(&configuration) {
                Ok(()) => {
                    state.reconfigure(Arc::clone(&configuration));
                    Decision::Commit(Ok(()))
                }
                Err(err) => Decision::Skip(Err(err)),
            }
        });
        match &result {
            Ok(()) => debug!(?configuration, "replaced bucket configuration"),
            Err(err) => warn!(%err, "rejected bucket configuration"),
        }
        result
    }

    /// Returns the number of tokens currently available for consumption.
    ///
    /// Negative while a reservation is being repaid. Never publishes
    /// anything.
    pub fn available_tokens(&self) -> i64 {
        let now = self.clock.now();
        let mut snapshot = StateWithConfiguration::clone(&self.storage.load());
        snapshot.refill_all(now);
        snapshot.available_tokens()
    }

    /// A detached copy of the published ledger, as last written. It is not
    /// refilled to the current time.
    pub fn create_snapshot(&self) -> BucketState {
        self.storage.load().state.clone()
    }

    /// The currently published configuration.
    pub fn configuration(&self) -> Arc<BucketConfiguration> {
        Arc::clone(&self.storage.load().configuration)
    }

    /// In-process buckets never suspend, so the asynchronous calling
    /// convention is always supported.
    pub fn is_async_supported(&self) -> bool {
        true
    }
}

impl<S: StateStorage, C> Debug for TokenBucket<S, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let published = self.storage.load();
        f.debug_struct("TokenBucket")
            .field("state", &published.state)
            .field("configuration", &published.configuration)
            .finish()
    }
}

fn as_balance(tokens: NonZeroU64) -> i64 {
    i64::try_from(tokens.get()).unwrap_or(i64::MAX)
}
