mod stream;

use std::num::NonZeroU64;
use std::time::Duration;

use futures::Stream;

pub use stream::{RateLimitedStream, WeightedStream};

use crate::storage::StateStorage;
use crate::{Clock, Nanos, TokenBucket};

pub trait RateLimitedStreamExt<S, ST, C>
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
{
    fn rate_limit(self, bucket: TokenBucket<ST, C>) -> RateLimitedStream<S, ST, C>;
}

impl<S, ST, C> RateLimitedStreamExt<S, ST, C> for S
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
{
    fn rate_limit(self, bucket: TokenBucket<ST, C>) -> RateLimitedStream<S, ST, C> {
        RateLimitedStream::new(self, bucket)
    }
}

/// How long a stream holds an item the bucket cannot supply before asking
/// again.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

enum Reservation {
    /// The tokens were in the bucket and are consumed.
    Ready,
    /// The tokens are consumed ahead of refill and usable after the wait.
    Wait(Duration),
    /// No refill will ever supply the tokens. Nothing was consumed.
    Never,
}

/// Reserves tokens without bounding the wait.
fn reserve<ST: StateStorage, C: Clock>(
    bucket: &TokenBucket<ST, C>,
    tokens: NonZeroU64,
) -> Reservation {
    let wait = bucket.reserve_and_calculate_time_to_sleep(tokens, Nanos::INFINITE);
    match wait.as_duration() {
        Some(wait) if wait.is_zero() => Reservation::Ready,
        Some(wait) => Reservation::Wait(wait),
        None => Reservation::Never,
    }
}
