use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A non-negative span of time in nanoseconds.
///
/// [`Nanos::INFINITE`] is a dedicated sentinel for waits that can never
/// complete, for instance when a bandwidth does not refill at all. Arithmetic
/// that would overflow saturates into the sentinel instead of wrapping.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nanos(u64);

impl Nanos {
    pub const ZERO: Nanos = Nanos(0);
    pub const INFINITE: Nanos = Nanos(u64::MAX);

    pub const fn new(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_infinite(&self) -> bool {
        self.0 == u64::MAX
    }

    /// The span as a [`Duration`], or `None` for [`Nanos::INFINITE`].
    pub const fn as_duration(&self) -> Option<Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(Duration::from_nanos(self.0))
        }
    }

    pub(crate) fn from_u128_saturating(nanos: u128) -> Self {
        match u64::try_from(nanos) {
            Ok(nanos) => Self(nanos),
            Err(_) => Self::INFINITE,
        }
    }
}

impl From<Duration> for Nanos {
    fn from(duration: Duration) -> Self {
        Self::from_u128_saturating(duration.as_nanos())
    }
}

impl Debug for Nanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_duration() {
            Some(dur) => Debug::fmt(&dur, f),
            None => f.write_str("inf"),
        }
    }
}

impl Display for Nanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Trait for monotonic clock implementations used by token buckets.
///
/// Implementations must provide monotonic time that never goes backwards.
/// Buckets tolerate a clock that does, by treating the elapsed time as zero,
/// but refill stalls until the clock catches up again.
pub trait Clock {
    /// Returns the current time in nanoseconds since an arbitrary epoch.
    fn now(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

fn duration_as_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Standard clock implementation using [`std::time::Instant`].
///
/// This provides high precision timing but may be slower than alternatives.
/// For high-performance scenarios, consider using `FastClock` with the
/// `quanta` feature.
///
/// # Examples
///
/// ```rust
/// use lockfree_bucket::{Bandwidth, BucketConfiguration, StdClock, TokenBucket};
/// use std::num::NonZeroU64;
///
/// let configuration = BucketConfiguration::builder()
///     .add_limit(Bandwidth::per_second(NonZeroU64::new(100).unwrap()))
///     .build()
///     .unwrap();
/// let bucket = TokenBucket::with_clock(configuration, StdClock::default());
/// ```
#[derive(Clone)]
pub struct StdClock {
    origin: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> u64 {
        duration_as_nanos(std::time::Instant::now().duration_since(self.origin))
    }
}

/// High-precision clock implementation using the `quanta` crate.
///
/// Requires the "quanta" feature to be enabled.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct QuantaClock {
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for QuantaClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl QuantaClock {
    /// Creates a new `QuantaClock` from a `quanta::Clock` instance.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self { origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for QuantaClock {
    fn now(&self) -> u64 {
        duration_as_nanos(self.origin.elapsed())
    }
}

/// Tokio-compatible clock implementation using [`tokio::time::Instant`].
///
/// Follows tokio's paused clock in tests, which makes it the clock of choice
/// for the stream adapters. Requires the "tokio" feature.
#[cfg(feature = "tokio")]
#[derive(Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

#[cfg(feature = "tokio")]
impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tokio")]
impl Clock for TokioClock {
    fn now(&self) -> u64 {
        duration_as_nanos(self.origin.elapsed())
    }
}

/// High-performance clock using quanta's coarse timing.
///
/// Sacrifices some precision for speed. The precision depends on how
/// frequently quanta's upkeep thread runs. Requires the "quanta" feature.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct FastClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for FastClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl FastClock {
    /// Creates a new `FastClock` from a `quanta::Clock` instance.
    ///
    /// **Important**: Ensure the clock's upkeep thread is running, otherwise
    /// the token bucket will not observe clock changes and will never refill.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.recent();
        Self { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for FastClock {
    fn now(&self) -> u64 {
        duration_as_nanos(self.clock.recent() - self.origin)
    }
}

/// Manual clock implementation for testing and simulation.
///
/// Allows precise control over time progression, making it ideal for unit tests
/// and deterministic simulations of rate limiting behavior. The clock is
/// thread-safe and can be shared across multiple threads.
///
/// # Examples
///
/// ```rust
/// use lockfree_bucket::{Bandwidth, BucketConfiguration, ManualClock, TokenBucket};
/// use std::num::NonZeroU64;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let ten = NonZeroU64::new(10).unwrap();
/// let configuration = BucketConfiguration::builder()
///     .add_limit(Bandwidth::per_second(ten).with_initial_tokens(0))
///     .build()
///     .unwrap();
/// let clock = Arc::new(ManualClock::default());
/// let bucket = TokenBucket::with_clock(configuration, Arc::clone(&clock));
///
/// // Initially no tokens available
/// assert!(!bucket.try_consume(NonZeroU64::MIN));
///
/// // Advance time by 100ms, one token accrues
/// clock.advance(Duration::from_millis(100));
/// assert!(bucket.try_consume(NonZeroU64::MIN));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a new manual clock starting at the specified time in nanoseconds.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Sets the current time to the specified value in nanoseconds.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Release);
    }

    /// Advances the current time by the specified duration.
    pub fn advance(&self, delta: Duration) {
        self.advance_nanos(duration_as_nanos(delta));
    }

    /// Advances the current time by the specified number of nanoseconds.
    pub fn advance_nanos(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_sentinel() {
        assert!(Nanos::INFINITE.is_infinite());
        assert!(Nanos::INFINITE.as_duration().is_none());
        assert_eq!(Nanos::from_u128_saturating(u128::MAX), Nanos::INFINITE);
        assert_eq!(
            Some(Duration::from_millis(500)),
            Nanos::new(500_000_000).as_duration()
        );
        assert_eq!("inf", Nanos::INFINITE.to_string());
        assert_eq!("500ms", Nanos::new(500_000_000).to_string());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = Arc::new(ManualClock::new(5));
        assert_eq!(5, clock.now());
        clock.advance(Duration::from_micros(1));
        assert_eq!(1_005, clock.now());
        clock.set(42);
        assert_eq!(42, (&clock).now());
    }

    #[test]
    fn std_clock_is_monotonic() {
        let clock = StdClock::default();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
