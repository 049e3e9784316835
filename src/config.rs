use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigurationError, IncompatibleConfiguration};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// A single capacity and refill-rate constraint.
///
/// Tokens are added at `refill_tokens` per `refill_period` up to `capacity`.
/// A bucket may combine several bandwidths, e.g. a short burst cap and a
/// longer sustained rate, in which case the scarcest one governs what can be
/// consumed.
///
/// A bandwidth starts full unless [`with_initial_tokens`](Self::with_initial_tokens)
/// says otherwise.
///
/// # Examples
///
/// ```rust
/// use lockfree_bucket::Bandwidth;
/// use std::num::NonZeroU64;
///
/// // 100 tokens per second, capacity of 200
/// let bandwidth = Bandwidth::per_second(NonZeroU64::new(100).unwrap())
///     .with_capacity(NonZeroU64::new(200).unwrap());
/// assert_eq!(100.0, bandwidth.rate_per_second());
/// assert_eq!(200, bandwidth.capacity().get());
///
/// // 60 tokens per minute, starting empty
/// let bandwidth = Bandwidth::per_minute(NonZeroU64::new(60).unwrap()).with_initial_tokens(0);
/// assert_eq!(1.0, bandwidth.rate_per_second());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Bandwidth {
    capacity: NonZeroU64,
    refill_tokens: u64,
    refill_period_nanos: u64,
    initial_tokens: Option<u64>,
    id: Option<Arc<str>>,
}

impl std::fmt::Debug for Bandwidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bandwidth(capacity={}, refill={} per {:?}, initial={}",
            self.capacity,
            self.refill_tokens,
            self.refill_period(),
            self.initial_tokens()
        )?;
        if let Some(id) = &self.id {
            write!(f, ", id={id}")?;
        }
        f.write_str(")")
    }
}

impl Bandwidth {
    /// Refills `rate` tokens per second, with a capacity equal to the rate.
    pub const fn per_second(rate: NonZeroU64) -> Self {
        Self::per_period_nanos(rate, NANOS_PER_SECOND)
    }

    /// Refills `rate` tokens per minute, with a capacity equal to the rate.
    pub const fn per_minute(rate: NonZeroU64) -> Self {
        Self::per_period_nanos(rate, NANOS_PER_MINUTE)
    }

    /// Refills `rate` tokens per hour, with a capacity equal to the rate.
    pub const fn per_hour(rate: NonZeroU64) -> Self {
        Self::per_period_nanos(rate, NANOS_PER_HOUR)
    }

    /// Refills `tokens` every `period`, with a capacity equal to `tokens`.
    ///
    /// Periods longer than `u64::MAX` nanoseconds are clamped.
    pub fn per_period(tokens: NonZeroU64, period: Duration) -> Self {
        let period = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
        Self::per_period_nanos(tokens, period)
    }

    /// A bandwidth that never refills by itself; tokens only come back through
    /// explicit additions.
    pub const fn non_refilling(capacity: NonZeroU64) -> Self {
        Self {
            capacity,
            refill_tokens: 0,
            refill_period_nanos: NANOS_PER_SECOND,
            initial_tokens: None,
            id: None,
        }
    }

    const fn per_period_nanos(tokens: NonZeroU64, period_nanos: u64) -> Self {
        Self {
            capacity: tokens,
            refill_tokens: tokens.get(),
            refill_period_nanos: period_nanos,
            initial_tokens: None,
            id: None,
        }
    }

    /// Sets a custom capacity, keeping the refill rate.
    pub const fn with_capacity(mut self, capacity: NonZeroU64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of tokens the bandwidth starts with.
    pub const fn with_initial_tokens(mut self, initial_tokens: u64) -> Self {
        self.initial_tokens = Some(initial_tokens);
        self
    }

    /// Tags the bandwidth so that reconfiguration can verify it still refers
    /// to the same constraint.
    pub fn with_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Maximum number of tokens the bandwidth can hold.
    pub const fn capacity(&self) -> NonZeroU64 {
        self.capacity
    }

    /// Tokens added every [`refill_period`](Self::refill_period).
    pub const fn refill_tokens(&self) -> u64 {
        self.refill_tokens
    }

    pub const fn refill_period(&self) -> Duration {
        Duration::from_nanos(self.refill_period_nanos)
    }

    pub const fn refill_period_nanos(&self) -> u64 {
        self.refill_period_nanos
    }

    pub const fn initial_tokens(&self) -> u64 {
        match self.initial_tokens {
            Some(initial) => initial,
            None => self.capacity.get(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the refill rate in tokens per second.
    pub fn rate_per_second(&self) -> f64 {
        if self.refill_period_nanos == 0 {
            return 0.0;
        }
        self.refill_tokens as f64 * NANOS_PER_SECOND as f64 / self.refill_period_nanos as f64
    }

    /// Capacity as a signed balance. Capacities beyond `i64::MAX` are clamped.
    pub(crate) fn capacity_tokens(&self) -> i64 {
        i64::try_from(self.capacity.get()).unwrap_or(i64::MAX)
    }

    fn validate(&self, position: usize) -> Result<(), ConfigurationError> {
        if self.refill_period_nanos == 0 {
            return Err(ConfigurationError::ZeroRefillPeriod { position });
        }
        if self.initial_tokens() > self.capacity.get() {
            return Err(ConfigurationError::InitialTokensExceedCapacity {
                position,
                initial: self.initial_tokens(),
                capacity: self.capacity.get(),
            });
        }
        Ok(())
    }
}

/// An ordered, non-empty set of [`Bandwidth`]s applied together.
///
/// # Examples
///
/// ```rust
/// use lockfree_bucket::{Bandwidth, BucketConfiguration};
/// use std::num::NonZeroU64;
///
/// let configuration = BucketConfiguration::builder()
///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()).with_id("burst"))
///     .add_limit(Bandwidth::per_hour(NonZeroU64::new(1000).unwrap()).with_id("sustained"))
///     .build()
///     .unwrap();
/// assert_eq!(2, configuration.bandwidths().len());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfiguration {
    bandwidths: Box<[Bandwidth]>,
}

impl BucketConfiguration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn bandwidths(&self) -> &[Bandwidth] {
        &self.bandwidths
    }

    /// Whether `other` can replace this configuration on a live bucket.
    pub fn is_compatible_with(&self, other: &BucketConfiguration) -> bool {
        self.check_compatibility(other).is_ok()
    }

    /// Same bandwidth count, and identifiers match position by position
    /// wherever both sides carry one.
    pub fn check_compatibility(
        &self,
        other: &BucketConfiguration,
    ) -> Result<(), IncompatibleConfiguration> {
        if self.bandwidths.len() != other.bandwidths.len() {
            return Err(IncompatibleConfiguration::BandwidthCount {
                previous: self.bandwidths.len(),
                requested: other.bandwidths.len(),
            });
        }
        let mismatch = self
            .bandwidths
            .iter()
            .zip(other.bandwidths.iter())
            .enumerate()
            .find_map(|(position, (previous, requested))| match (previous.id(), requested.id()) {
                (Some(previous), Some(requested)) if previous != requested => {
                    Some((position, previous, requested))
                }
                _ => None,
            });
        match mismatch {
            Some((position, previous, requested)) => {
                Err(IncompatibleConfiguration::BandwidthIdentity {
                    position,
                    previous: previous.to_owned(),
                    requested: requested.to_owned(),
                })
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigurationBuilder {
    bandwidths: Vec<Bandwidth>,
}

impl ConfigurationBuilder {
    /// Appends a bandwidth. Order matters for reconfiguration.
    pub fn add_limit(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidths.push(bandwidth);
        self
    }

    pub fn build(self) -> Result<BucketConfiguration, ConfigurationError> {
        if self.bandwidths.is_empty() {
            return Err(ConfigurationError::NoBandwidths);
        }
        for (position, bandwidth) in self.bandwidths.iter().enumerate() {
            bandwidth.validate(position)?;
        }
        Ok(BucketConfiguration {
            bandwidths: self.bandwidths.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;

    use super::*;

    #[test]
    fn rates() {
        let bandwidth = Bandwidth::per_minute(nonzero!(30u64));
        assert_eq!(0.5, bandwidth.rate_per_second());
        assert_eq!(30, bandwidth.capacity().get());
        assert_eq!(30, bandwidth.initial_tokens());
        assert_eq!(Duration::from_secs(60), bandwidth.refill_period());

        let bandwidth = Bandwidth::per_period(nonzero!(5u64), Duration::from_millis(500))
            .with_capacity(nonzero!(50u64))
            .with_initial_tokens(0);
        assert_eq!(10.0, bandwidth.rate_per_second());
        assert_eq!(50, bandwidth.capacity().get());
        assert_eq!(0, bandwidth.initial_tokens());

        let bandwidth = Bandwidth::non_refilling(nonzero!(3u64));
        assert_eq!(0.0, bandwidth.rate_per_second());
        assert_eq!(3, bandwidth.initial_tokens());
    }

    #[test]
    fn build_validates() {
        assert_eq!(
            Err(ConfigurationError::NoBandwidths),
            BucketConfiguration::builder().build()
        );
        assert_eq!(
            Err(ConfigurationError::ZeroRefillPeriod { position: 1 }),
            BucketConfiguration::builder()
                .add_limit(Bandwidth::per_second(nonzero!(1u64)))
                .add_limit(Bandwidth::per_period(nonzero!(1u64), Duration::ZERO))
                .build()
        );
        assert_eq!(
            Err(ConfigurationError::InitialTokensExceedCapacity {
                position: 0,
                initial: 11,
                capacity: 10,
            }),
            BucketConfiguration::builder()
                .add_limit(Bandwidth::per_second(nonzero!(10u64)).with_initial_tokens(11))
                .build()
        );
    }

    #[test]
    fn compatibility() {
        let one = BucketConfiguration::builder()
            .add_limit(Bandwidth::per_second(nonzero!(10u64)).with_id("burst"))
            .build()
            .unwrap();
        let two = BucketConfiguration::builder()
            .add_limit(Bandwidth::per_second(nonzero!(10u64)))
            .add_limit(Bandwidth::per_hour(nonzero!(100u64)))
            .build()
            .unwrap();
        let renamed = BucketConfiguration::builder()
            .add_limit(Bandwidth::per_second(nonzero!(20u64)).with_id("sustained"))
            .build()
            .unwrap();
        let anonymous = BucketConfiguration::builder()
            .add_limit(Bandwidth::per_second(nonzero!(20u64)))
            .build()
            .unwrap();

        assert!(one.is_compatible_with(&anonymous));
        assert!(anonymous.is_compatible_with(&one));
        assert_eq!(
            Err(IncompatibleConfiguration::BandwidthCount {
                previous: 1,
                requested: 2
            }),
            one.check_compatibility(&two)
        );
        assert_eq!(
            Err(IncompatibleConfiguration::BandwidthIdentity {
                position: 0,
                previous: "burst".to_owned(),
                requested: "sustained".to_owned(),
            }),
            one.check_compatibility(&renamed)
        );
    }
}
