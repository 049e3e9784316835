use std::future::Future;
use std::num::NonZeroU64;
use std::sync::Arc;

use futures::future;

use crate::bucket::TokenBucket;
use crate::clock::{Clock, Nanos};
use crate::config::BucketConfiguration;
use crate::error::IncompatibleConfiguration;
use crate::probe::ConsumptionProbe;
use crate::state::BucketState;
use crate::storage::StateStorage;

/// The operations of a token bucket, in blocking and asynchronous flavors.
///
/// Buckets living in process memory complete every operation without
/// suspending, so the `*_async` counterparts return futures that are ready on
/// first poll. Implementations backed by remote storage may override them.
pub trait Bucket {
    fn try_consume(&self, tokens: NonZeroU64) -> bool;

    fn try_consume_as_much_as_possible(&self, limit: NonZeroU64) -> u64;

    fn try_consume_and_return_remaining(&self, tokens: NonZeroU64) -> ConsumptionProbe;

    fn reserve_and_calculate_time_to_sleep(&self, tokens: NonZeroU64, max_wait: Nanos) -> Nanos;

    fn add_tokens(&self, tokens: NonZeroU64);

    fn replace_configuration(
        &self,
        configuration: BucketConfiguration,
    ) -> Result<(), IncompatibleConfiguration>;

    fn available_tokens(&self) -> i64;

    fn create_snapshot(&self) -> BucketState;

    fn configuration(&self) -> Arc<BucketConfiguration>;

    /// Whether the `*_async` operations are meaningful for this bucket.
    fn is_async_supported(&self) -> bool;

    fn try_consume_async(&self, tokens: NonZeroU64) -> impl Future<Output = bool> {
        future::ready(self.try_consume(tokens))
    }

    fn try_consume_as_much_as_possible_async(
        &self,
        limit: NonZeroU64,
    ) -> impl Future<Output = u64> {
        future::ready(self.try_consume_as_much_as_possible(limit))
    }

    fn try_consume_and_return_remaining_async(
        &self,
        tokens: NonZeroU64,
    ) -> impl Future<Output = ConsumptionProbe> {
        future::ready(self.try_consume_and_return_remaining(tokens))
    }

    fn reserve_and_calculate_time_to_sleep_async(
        &self,
        tokens: NonZeroU64,
        max_wait: Nanos,
    ) -> impl Future<Output = Nanos> {
        future::ready(self.reserve_and_calculate_time_to_sleep(tokens, max_wait))
    }

    fn add_tokens_async(&self, tokens: NonZeroU64) -> impl Future<Output = ()> {
        self.add_tokens(tokens);
        future::ready(())
    }

    /// Resolves to the same error the blocking call returns when the
    /// configuration is incompatible.
    fn replace_configuration_async(
        &self,
        configuration: BucketConfiguration,
    ) -> impl Future<Output = Result<(), IncompatibleConfiguration>> {
        future::ready(self.replace_configuration(configuration))
    }

    fn available_tokens_async(&self) -> impl Future<Output = i64> {
        future::ready(self.available_tokens())
    }

    fn create_snapshot_async(&self) -> impl Future<Output = BucketState> {
        future::ready(self.create_snapshot())
    }
}

impl<S: StateStorage, C: Clock> Bucket for TokenBucket<S, C> {
    fn try_consume(&self, tokens: NonZeroU64) -> bool {
        TokenBucket::try_consume(self, tokens)
    }

    fn try_consume_as_much_as_possible(&self, limit: NonZeroU64) -> u64 {
        TokenBucket::try_consume_as_much_as_possible(self, limit)
    }

    fn try_consume_and_return_remaining(&self, tokens: NonZeroU64) -> ConsumptionProbe {
        TokenBucket::try_consume_and_return_remaining(self, tokens)
    }

    fn reserve_and_calculate_time_to_sleep(&self, tokens: NonZeroU64, max_wait: Nanos) -> Nanos {
        TokenBucket::reserve_and_calculate_time_to_sleep(self, tokens, max_wait)
    }

    fn add_tokens(&self, tokens: NonZeroU64) {
        TokenBucket::add_tokens(self, tokens)
    }

    fn replace_configuration(
        &self,
        configuration: BucketConfiguration,
    ) -> Result<(), IncompatibleConfiguration> {
        TokenBucket::replace_configuration(self, configuration)
    }

    fn available_tokens(&self) -> i64 {
        TokenBucket::available_tokens(self)
    }

    fn create_snapshot(&self) -> BucketState {
        TokenBucket::create_snapshot(self)
    }

    fn configuration(&self) -> Arc<BucketConfiguration> {
        TokenBucket::configuration(self)
    }

    fn is_async_supported(&self) -> bool {
        TokenBucket::is_async_supported(self)
    }
}
