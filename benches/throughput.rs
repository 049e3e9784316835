use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use lockfree_bucket::{
    AtomicStorage, Bandwidth, BucketConfiguration, FastClock, LocalStorage, LockedStorage,
    ManualClock, Nanos, QuantaClock, StateStorage, StdClock, TokenBucket,
};
use nonzero_ext::nonzero;

fn configuration(rate: NonZeroU64) -> BucketConfiguration {
    BucketConfiguration::builder()
        .add_limit(Bandwidth::per_second(rate))
        .build()
        .unwrap()
}

fn bench_consume(c: &mut Criterion) {
    let clock = quanta::Clock::new();
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_micros(10), clock.clone())
        .start()
        .unwrap();
    let clock = FastClock::new(clock);
    let limit = || configuration(nonzero!(10_000u64));
    let quanta_tb = TokenBucket::with_clock(limit(), QuantaClock::default());
    let std_tb = TokenBucket::with_clock(limit(), StdClock::default());
    let fast_tb = TokenBucket::<LocalStorage, _>::from_parts(limit(), clock.clone());
    let fast_tb_atomic = TokenBucket::with_clock(limit(), clock.clone());
    std::thread::sleep(Duration::from_secs(1));
    let mut group = c.benchmark_group("tokenbucket");
    group
        .throughput(Throughput::Elements(1))
        .sample_size(100)
        .bench_function("consume-mock-clock-local-storage", |b| {
            let clock = ManualClock::default();
            let tb = TokenBucket::<LocalStorage, _>::from_parts(limit(), &clock);
            clock.set(10_000_000_000);
            b.iter(|| {
                let _x = std::hint::black_box(tb.try_consume(NonZeroU64::MIN));
            });
        })
        .bench_function("consume-mock-clock-atomic-storage", |b| {
            let clock = ManualClock::default();
            let tb = TokenBucket::with_clock(limit(), &clock);
            clock.set(10_000_000_000);
            b.iter(|| {
                let _x = std::hint::black_box(tb.try_consume(NonZeroU64::MIN));
            });
        })
        .bench_function("consume-mock-clock-locked-storage", |b| {
            let clock = ManualClock::default();
            let tb = TokenBucket::<LockedStorage, _>::from_parts(limit(), &clock);
            clock.set(10_000_000_000);
            b.iter(|| {
                let _x = std::hint::black_box(tb.try_consume(NonZeroU64::MIN));
            });
        })
        .bench_function("consume-std-clock-atomic-storage", |b| {
            b.iter(|| std_tb.try_consume(NonZeroU64::MIN));
        })
        .bench_function("consume-fast-clock-local-storage", |b| {
            b.iter(|| fast_tb.try_consume(NonZeroU64::MIN));
        })
        .bench_function("consume-fast-clock-atomic-storage", |b| {
            b.iter(|| fast_tb_atomic.try_consume(NonZeroU64::MIN))
        })
        .bench_function("consume-quanta-clock-atomic-storage", |b| {
            b.iter(|| quanta_tb.try_consume(NonZeroU64::MIN));
        });
    group.finish();
}

const THREADS: u32 = 24;

fn contended<S>(b: &mut criterion::Bencher<'_>, rate: NonZeroU64, clock: &FastClock, reserve: bool)
where
    S: StateStorage + Send + Sync + 'static,
{
    b.iter_custom(|iters| {
        let tb = Arc::new(TokenBucket::<S, _>::from_parts(
            configuration(rate),
            clock.clone(),
        ));
        let mut children = vec![];
        let start = std::time::Instant::now();
        for _i in 0..THREADS {
            let tb = Arc::clone(&tb);
            children.push(std::thread::spawn(move || {
                for _i in 0..iters {
                    if reserve {
                        let _x = std::hint::black_box(
                            tb.reserve_and_calculate_time_to_sleep(NonZeroU64::MIN, Nanos::INFINITE),
                        );
                    } else {
                        std::hint::black_box(tb.try_consume(NonZeroU64::MIN));
                    }
                }
            }));
        }
        for child in children {
            child.join().unwrap()
        }
        start.elapsed()
    })
}

fn multi_threaded(c: &mut Criterion) {
    let clock = quanta::Clock::new();
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_micros(100), clock.clone())
        .start()
        .unwrap();
    let clock = FastClock::new(clock);
    let mut group = c.benchmark_group("multi_threaded_reserve");
    group
        .throughput(Throughput::Elements(1))
        .bench_function("atomic", |b| {
            contended::<AtomicStorage>(b, nonzero!(10_000u64), &clock, true)
        })
        .bench_function("locked", |b| {
            contended::<LockedStorage>(b, nonzero!(10_000u64), &clock, true)
        });
    group.finish();

    // mostly rejections once the bucket runs dry
    let mut group = c.benchmark_group("multi_threaded_consume");
    group
        .throughput(Throughput::Elements(1))
        .bench_function("atomic", |b| {
            contended::<AtomicStorage>(b, nonzero!(50u64), &clock, false)
        })
        .bench_function("locked", |b| {
            contended::<LockedStorage>(b, nonzero!(50u64), &clock, false)
        });
    group.finish();
}

criterion_group!(benches, bench_consume, multi_threaded);
criterion_main!(benches);
