use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use lockfree_bucket::futures::RateLimitedStreamExt;
use lockfree_bucket::{Bandwidth, BucketConfiguration, FastClock, Nanos, TokenBucket};
use nonzero_ext::nonzero;
use tokio::task::JoinSet;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let clock = quanta::Clock::new();
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_micros(150), clock.clone())
        .start()
        .unwrap();
    let clock = FastClock::new(clock);

    let configuration = || {
        BucketConfiguration::builder()
            .add_limit(Bandwidth::per_second(nonzero!(5u64)))
            .build()
            .unwrap()
    };

    // ten sources merged into a single throttled stream
    let start = tokio::time::Instant::now();
    let sources = (1..=10).map(|i| stream::iter(1..=5).map(move |item| (i, item)));
    let bucket = TokenBucket::with_clock(configuration(), clock.clone());
    let mut merged = std::pin::pin!(stream::select_all(sources).rate_limit(bucket));
    while let Some((i, item)) = merged.next().await {
        println!("[stream={i}] item: {}, elapsed={:?}", item, start.elapsed());
    }
    println!("Stream completed in {:?}", start.elapsed());

    // tasks sharing one lock-free bucket, sleeping off their reservations
    let start = tokio::time::Instant::now();
    let bucket = Arc::new(TokenBucket::with_clock(configuration(), clock));
    let mut handles = JoinSet::new();
    for i in 1..=10 {
        let bucket = Arc::clone(&bucket);
        handles.spawn(async move {
            for item in 1..=5 {
                let wait = bucket.reserve_and_calculate_time_to_sleep(nonzero!(1u64), Nanos::INFINITE);
                if let Some(wait) = wait.as_duration() {
                    tokio::time::sleep(wait).await;
                }
                println!("[task={i}] item: {}, elapsed={:?}", item, start.elapsed());
            }
        });
    }

    handles.join_all().await;
    println!("Tasks completed in {:?}", start.elapsed());
}
