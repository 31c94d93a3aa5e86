use chrono::Utc;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use scale_core::RecordEvent;
use scale_core::analytics::{Analytics, compose_analytics_in, partition_events};

// A month of cycles, one every ~3 minutes, with a few target weights.
fn synth_events(n: usize, seed: u32) -> Vec<RecordEvent> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    let base = 1_714_521_600_000_i64; // 2024-05-01T00:00Z
    (0..n)
        .map(|i| {
            let r = next();
            RecordEvent {
                start_time: base + i as i64 * 180_000,
                slow_offset_ms: 4_000,
                duration_ms: 6_000 + i64::from(r % 1_000),
                target_weight: [10_000, 25_000, 50_000][(r % 3) as usize],
                weight_error: (r % 200) as i32 - 100,
                fast_slow_percentage: 0.95,
                error_percentage: f64::from(r % 100) / 10_000.0,
                resting_time: 2_000,
                fast_feed_speed: 50,
                slow_feed_speed: 20,
            }
        })
        .collect()
}

fn bench_fold(c: &mut Criterion) {
    let events = synth_events(15_000, 0xC0FFEE);
    let midnight = events[events.len() - 100].start_time;

    c.bench_function("partition_15k", |b| {
        b.iter_batched(
            || events.clone(),
            |ev| black_box(partition_events(ev, midnight)),
            BatchSize::LargeInput,
        )
    });

    let (prior, _) = partition_events(events.clone(), midnight);
    c.bench_function("compose_into_empty", |b| {
        b.iter_batched(
            Analytics::new,
            |mut a| {
                compose_analytics_in(&mut a, black_box(&prior), &Utc);
                a
            },
            BatchSize::SmallInput,
        )
    });

    let mut warm = Analytics::new();
    compose_analytics_in(&mut warm, &prior, &Utc);
    c.bench_function("compose_into_existing", |b| {
        b.iter_batched(
            || warm.clone(),
            |mut a| {
                compose_analytics_in(&mut a, black_box(&prior), &Utc);
                a
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_fold);
criterion_main!(benches);
