use std::time::Duration;

use lockfree_bucket::{Bandwidth, BucketConfiguration, FastClock, TokenBucket};
use nonzero_ext::nonzero;

fn main() {
    let clock = quanta::Clock::new();
    // Updates at 1Khz
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_millis(1), clock.clone())
        .start()
        .unwrap();
    let clock = FastClock::new(clock);
    let configuration = BucketConfiguration::builder()
        .add_limit(
            Bandwidth::per_second(nonzero!(10u64))
                .with_capacity(nonzero!(20u64))
                .with_initial_tokens(0),
        )
        .build()
        .unwrap();
    let tb = TokenBucket::with_clock(configuration, clock);
    // after two seconds bucket should be full
    println!("sleeping for 2 seconds...");
    std::thread::sleep(Duration::from_secs(2));
    println!("available: {}", tb.available_tokens());
    assert!(tb.try_consume(nonzero!(5u64)));
    println!("Consumed 5, available: {}", tb.available_tokens());
}
