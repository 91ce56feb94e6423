use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use oam_sim::events::{EventKind, EventQueue};

const EVENT_COUNTS: &[usize] = &[128, 1_024, 8_192, 65_536];

fn build_events(count: usize) -> Vec<(u64, EventKind)> {
    (0..count)
        .map(|idx| {
            // Coarse ticks so many events share a tick and order by sequence.
            let tick = (idx / 4) as u64;
            let event = if idx % 2 == 0 {
                EventKind::Degrade {
                    element: format!("gnb-{:03}", idx % 16),
                    severity: 20,
                }
            } else {
                EventKind::Recover {
                    element: format!("gnb-{:03}", idx % 16),
                }
            };
            (tick, event)
        })
        .collect()
}

fn bench_engine_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_queue");

    for &count in EVENT_COUNTS {
        group.bench_with_input(BenchmarkId::new("push_pop", count), &count, |b, &count| {
            b.iter_batched(
                || (EventQueue::new(), build_events(count)),
                |(mut queue, events)| {
                    for (tick, event) in events {
                        queue.schedule(tick, event);
                    }
                    while let Some(event) = queue.pop_due(u64::MAX) {
                        black_box(event);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_engine_queue);
criterion_main!(benches);
