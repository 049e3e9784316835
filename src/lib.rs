#![doc = include_str!("../README.md")]
//!
//! # Core Components
//!
//! - [`TokenBucket`] - The token bucket engine with pluggable storage and clock
//! - [`Bandwidth`] and [`BucketConfiguration`] - Capacity and refill-rate limits
//! - [`BucketState`] - The per-bandwidth ledger of tokens and refill progress
//! - [`Bucket`] - The operations of a bucket, with asynchronous counterparts
//! - [`Clock`] trait and implementations for time sources
//! - Storage implementations for different concurrency needs
//!
//! # Quick Start
//!
//! ```rust
//! use std::num::NonZeroU64;
//! use std::time::Duration;
//!
//! use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
//!
//! // 10 tokens per second with bursts of up to 20, and at most 100 per minute
//! let configuration = BucketConfiguration::builder()
//!     .add_limit(
//!         Bandwidth::per_second(NonZeroU64::new(10).unwrap())
//!             .with_capacity(NonZeroU64::new(20).unwrap()),
//!     )
//!     .add_limit(Bandwidth::per_minute(NonZeroU64::new(100).unwrap()))
//!     .build()
//!     .unwrap();
//!
//! let bucket = TokenBucket::new(configuration);
//!
//! // Try to consume tokens
//! if bucket.try_consume(NonZeroU64::new(5).unwrap()) {
//!     println!("{} tokens left", bucket.available_tokens());
//! }
//!
//! // Or borrow from future refill, waiting at most a second
//! let wait = bucket.reserve_and_calculate_time_to_sleep(
//!     NonZeroU64::new(15).unwrap(),
//!     Duration::from_secs(1),
//! );
//! ```

mod api;
mod bucket;
mod clock;
mod config;
mod error;
#[cfg(feature = "async")]
pub mod futures;
mod probe;
mod state;
mod storage;

pub use api::Bucket;
pub use bucket::{LockFreeBucket, TokenBucket};
#[cfg(feature = "tokio")]
pub use clock::TokioClock;
pub use clock::{Clock, ManualClock, Nanos, StdClock};
#[cfg(feature = "quanta")]
pub use clock::{FastClock, QuantaClock};
pub use config::{Bandwidth, BucketConfiguration, ConfigurationBuilder};
pub use error::*;
#[cfg(feature = "async")]
pub use futures::RateLimitedStreamExt;
pub use probe::ConsumptionProbe;
pub use state::{BandwidthState, BucketState};

pub use storage::{
    StateStorage, StateWithConfiguration, atomic::AtomicStorage, local::LocalStorage,
    locked::LockedStorage,
};

pub(crate) mod private {
    pub trait Sealed {}
}
