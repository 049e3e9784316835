use std::num::NonZeroU64;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::Stream;
use pin_project_lite::pin_project;
use tracing::warn;

use super::{RETRY_INTERVAL, Reservation, reserve};
use crate::config::BucketConfiguration;
use crate::storage::StateStorage;
use crate::{bucket::TokenBucket, clock::Clock};
#[cfg(not(feature = "tokio-hrtime"))]
use tokio::time::{Instant, Sleep, sleep};
#[cfg(feature = "tokio-hrtime")]
use tokio_hrtime::{Sleep, sleep};

pin_project! {
    /// A stream wrapper that applies rate limiting using a token bucket.
    ///
    /// This stream consumes one token per item. Items are handed out as soon
    /// as they are reserved; when the reservation went into debt, the next
    /// item is held back until the debt is repaid. An item the bucket can
    /// never supply is held until tokens are added.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "async")]
    /// # {
    /// use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
    /// use lockfree_bucket::futures::RateLimitedStream;
    /// use futures::stream;
    /// use std::num::NonZeroU64;
    ///
    /// # async fn example() {
    /// let configuration = BucketConfiguration::builder()
    ///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()))
    ///     .build()
    ///     .unwrap();
    /// let bucket = TokenBucket::new(configuration);
    /// let stream = stream::iter(0..100);
    ///
    /// let rate_limited = RateLimitedStream::new(stream, bucket);
    /// # }
    /// # }
    /// ```
    pub struct RateLimitedStream<S, ST, C>
    where
        S: Stream,
        ST: StateStorage,
        C: Clock,
    {
        #[pin]
        stream: S,
        bucket: TokenBucket<ST, C>,
        #[pin]
        delay: Option<Sleep>,
        pending_item: Option<S::Item>,
    }
}

impl<S, ST, C> RateLimitedStream<S, ST, C>
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
{
    /// Creates a new rate-limited stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - The underlying stream to rate limit
    /// * `bucket` - The token bucket to use for rate limiting
    pub fn new(stream: S, bucket: TokenBucket<ST, C>) -> Self {
        Self {
            stream,
            bucket,
            delay: None,
            pending_item: None,
        }
    }

    /// Returns the configuration the bucket currently enforces.
    pub fn configuration(&self) -> Arc<BucketConfiguration> {
        self.bucket.configuration()
    }

    /// Returns the number of tokens currently available in the bucket.
    ///
    /// Negative while the stream is ahead of the refill.
    pub fn available_tokens(&self) -> i64 {
        self.bucket.available_tokens()
    }

    /// Adds tokens back to the bucket.
    ///
    /// Useful for returning tokens from cancelled operations or manually
    /// adding capacity.
    pub fn add_tokens(&self, tokens: impl Into<NonZeroU64>) {
        self.bucket.add_tokens(tokens)
    }
}

impl<S, ST, C> Stream for RateLimitedStream<S, ST, C>
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            // are we still repaying the previous item?
            if let Some(delay) = this.delay.as_mut().as_pin_mut() {
                ready!(delay.poll(cx));
            }

            let (item, held) = match this.pending_item.take() {
                Some(item) => (item, true),
                None => match ready!(this.stream.as_mut().poll_next(cx)) {
                    Some(item) => (item, false),
                    None => return Poll::Ready(None),
                },
            };

            // deliver immediately
            match reserve(this.bucket, NonZeroU64::MIN) {
                Reservation::Ready => this.delay.set(None),
                Reservation::Wait(duration) => set_delay(this.delay.as_mut(), duration),
                Reservation::Never => {
                    if !held {
                        warn!("token bucket never refills, holding item until tokens are added");
                    }
                    *this.pending_item = Some(item);
                    set_delay(this.delay.as_mut(), RETRY_INTERVAL);
                    continue;
                }
            }
            return Poll::Ready(Some(item));
        }
    }
}

pin_project! {
    /// A stream that is rate limited by a token bucket with weighted consumption.
    /// Each item can consume a different number of tokens based on a weight function.
    ///
    /// Unlike [`RateLimitedStream`], an item is only handed out once the
    /// tokens it reserved are actually available. An item the bucket can
    /// never supply is held until tokens are added.
    pub struct WeightedStream<S, ST, C, F>
    where
        S: Stream,
        ST: StateStorage,
        C: Clock,
        F: Fn(&S::Item) -> NonZeroU64,
    {
        #[pin]
        stream: S,
        bucket: TokenBucket<ST, C>,
        weight_fn: F,
        #[pin]
        delay: Option<Sleep>,
        pending_item: Option<S::Item>,
        // the pending item's tokens are consumed, it only waits for the delay
        reserved: bool,
    }
}

impl<S, ST, C, F> WeightedStream<S, ST, C, F>
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
    F: Fn(&S::Item) -> NonZeroU64,
{
    /// Creates a new weighted stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - The underlying stream to rate limit
    /// * `bucket` - The token bucket for rate limiting
    /// * `weight_fn` - A function that determines how many tokens each item consumes
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lockfree_bucket::futures::WeightedStream;
    /// use lockfree_bucket::{Bandwidth, BucketConfiguration, LocalStorage, TokioClock, TokenBucket};
    /// use futures::stream;
    /// use std::num::NonZeroU64;
    ///
    /// let configuration = BucketConfiguration::builder()
    ///     .add_limit(Bandwidth::per_second(NonZeroU64::new(10).unwrap()))
    ///     .build()
    ///     .unwrap();
    /// let bucket = TokenBucket::<LocalStorage, _>::from_parts(configuration, TokioClock::default());
    ///
    /// let stream = stream::iter(vec!["small", "large", "medium"]);
    /// let weighted_stream = WeightedStream::new(stream, bucket, |item: &&str| {
    ///     NonZeroU64::new(item.len() as u64).unwrap_or(NonZeroU64::MIN)
    /// });
    /// ```
    pub fn new(stream: S, bucket: TokenBucket<ST, C>, weight_fn: F) -> Self {
        Self {
            stream,
            bucket,
            weight_fn,
            delay: None,
            pending_item: None,
            reserved: false,
        }
    }

    /// Returns the configuration the bucket currently enforces.
    pub fn configuration(&self) -> Arc<BucketConfiguration> {
        self.bucket.configuration()
    }

    /// Available tokens in the bucket. Negative if in debt.
    pub fn available_tokens(&self) -> i64 {
        self.bucket.available_tokens()
    }

    /// Add tokens to the bucket.
    pub fn add_tokens(&self, tokens: impl Into<NonZeroU64>) {
        self.bucket.add_tokens(tokens)
    }
}

impl<S, ST, C, F> Stream for WeightedStream<S, ST, C, F>
where
    S: Stream,
    ST: StateStorage,
    C: Clock,
    F: Fn(&S::Item) -> NonZeroU64,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(delay) = this.delay.as_mut().as_pin_mut() {
                ready!(delay.poll(cx));
                this.delay.set(None);
            }

            let (item, held) = match this.pending_item.take() {
                Some(item) if *this.reserved => {
                    *this.reserved = false;
                    return Poll::Ready(Some(item));
                }
                Some(item) => (item, true),
                None => match ready!(this.stream.as_mut().poll_next(cx)) {
                    Some(item) => (item, false),
                    None => return Poll::Ready(None),
                },
            };

            let weight = (this.weight_fn)(&item);
            match reserve(this.bucket, weight) {
                Reservation::Ready => return Poll::Ready(Some(item)),
                Reservation::Wait(duration) => {
                    *this.reserved = true;
                    set_delay(this.delay.as_mut(), duration);
                }
                Reservation::Never => {
                    if !held {
                        warn!(
                            weight = weight.get(),
                            "token bucket never refills, holding item until tokens are added"
                        );
                    }
                    set_delay(this.delay.as_mut(), RETRY_INTERVAL);
                }
            }
            *this.pending_item = Some(item);
        }
    }
}

fn set_delay(mut delay: Pin<&mut Option<Sleep>>, duration: Duration) {
    #[cfg(feature = "tokio-hrtime")]
    {
        delay.set(Some(sleep(duration)));
    }
    #[cfg(not(feature = "tokio-hrtime"))]
    {
        if let Some(delay) = delay.as_mut().as_pin_mut() {
            delay.reset(Instant::now() + duration);
        } else {
            delay.set(Some(sleep(duration)));
        }
    }
}
