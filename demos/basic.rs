use std::time::Duration;

use lockfree_bucket::{Bandwidth, BucketConfiguration, TokenBucket};
use nonzero_ext::nonzero;

fn main() {
    let configuration = BucketConfiguration::builder()
        .add_limit(Bandwidth::per_second(nonzero!(10u64)).with_capacity(nonzero!(20u64)))
        .build()
        .unwrap();
    let tb = TokenBucket::new(configuration);
    assert_eq!(20, tb.try_consume_as_much_as_possible(nonzero!(100u64)));
    // after two seconds bucket should be full again
    std::thread::sleep(Duration::from_secs(2));
    assert!(tb.try_consume(nonzero!(5u64)));
    println!("{tb:?}");
}
