use futures::stream;
use lockfree_bucket::futures::WeightedStream;
use lockfree_bucket::{Bandwidth, BucketConfiguration, LocalStorage, TokenBucket, TokioClock};
use nonzero_ext::nonzero;
use std::num::NonZeroU64;
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
struct Task {
    name: String,
    size: u64,
}

impl Task {
    fn new(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

#[tokio::main]
async fn main() {
    println!("WeightedStream Example");
    println!("=====================");

    // Create a stream of tasks with different sizes
    let tasks = vec![
        Task::new("small_task", 1),
        Task::new("medium_task", 5),
        Task::new("large_task", 10),
        Task::new("tiny_task", 1),
        Task::new("huge_task", 20),
    ];

    let stream = stream::iter(tasks);

    // 5 tokens per second with a burst of 25, and no more than 30 per 10 seconds
    let configuration = BucketConfiguration::builder()
        .add_limit(Bandwidth::per_second(nonzero!(5u64)).with_capacity(nonzero!(25u64)))
        .add_limit(Bandwidth::per_period(nonzero!(30u64), std::time::Duration::from_secs(10)))
        .build()
        .unwrap();
    let bucket = TokenBucket::<LocalStorage, _>::from_parts(configuration, TokioClock::default());

    // Each task consumes tokens equal to its size
    let weighted_stream = WeightedStream::new(stream, bucket, |task: &Task| {
        NonZeroU64::new(task.size).unwrap_or(nonzero!(1u64))
    });

    println!("Processing tasks with weighted throttling...");
    println!("Throttling: 5 tokens/second, burst: 25 tokens, 30 tokens per 10 seconds");
    println!();

    let start = std::time::Instant::now();
    let mut weighted_stream = std::pin::pin!(weighted_stream);

    while let Some(task) = weighted_stream.next().await {
        let elapsed = start.elapsed();
        println!(
            "[{:>6.2}s] Processed task '{}' (size: {} tokens)",
            elapsed.as_secs_f64(),
            task.name,
            task.size
        );
    }

    println!();
    println!("Total time: {:.2}s", start.elapsed().as_secs_f64());
    println!("Balance: {}", weighted_stream.available_tokens());
}
