use std::sync::Arc;
use std::time::{Duration, Instant};

use lockfree_bucket::{Bandwidth, BucketConfiguration, LockFreeBucket, TokenBucket};
use nonzero_ext::nonzero;

fn main() {
    // 20 requests per second, but no more than 50 per 5 seconds
    let configuration = BucketConfiguration::builder()
        .add_limit(Bandwidth::per_second(nonzero!(20u64)).with_id("burst"))
        .add_limit(
            Bandwidth::per_period(nonzero!(50u64), Duration::from_secs(5)).with_id("sustained"),
        )
        .build()
        .unwrap();
    let bucket: Arc<LockFreeBucket> = Arc::new(TokenBucket::new(configuration));

    let start = Instant::now();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let bucket = Arc::clone(&bucket);
            std::thread::spawn(move || {
                for request in 0..15 {
                    let wait = bucket
                        .reserve_and_calculate_time_to_sleep(nonzero!(1u64), Duration::from_secs(2));
                    match wait.as_duration() {
                        Some(wait) => {
                            std::thread::sleep(wait);
                            println!(
                                "[worker={worker}] request {request} after {:?}",
                                start.elapsed()
                            );
                        }
                        None => println!("[worker={worker}] request {request} rejected"),
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    println!("balance: {}", bucket.available_tokens());

    // raise the sustained limit without losing track of what was spent
    let relaxed = BucketConfiguration::builder()
        .add_limit(Bandwidth::per_second(nonzero!(20u64)).with_id("burst"))
        .add_limit(
            Bandwidth::per_period(nonzero!(100u64), Duration::from_secs(5)).with_id("sustained"),
        )
        .build()
        .unwrap();
    bucket.replace_configuration(relaxed).unwrap();
    println!("after reconfiguration: {:?}", bucket.create_snapshot());
}
