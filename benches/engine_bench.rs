use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use oam_sim::engine::run_simulation;
use oam_sim::models::{SimConfig, TrafficConfig};

const TICKS: u64 = 500;

fn build_config(fault_rate: f64, traffic: TrafficConfig) -> SimConfig {
    let mut config = SimConfig::reference_network();
    config.clock.ticks = TICKS;
    config.simulator.fault_rate = fault_rate;
    config.simulator.scenario_rate = fault_rate / 10.0;
    config.traffic = traffic;
    config
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let cases = [
        ("quiet", 0.0, TrafficConfig::Synthetic),
        ("faulty", 0.2, TrafficConfig::Synthetic),
        ("faulty-silent", 0.2, TrafficConfig::Silent),
    ];

    for (label, fault_rate, traffic) in cases {
        group.bench_with_input(
            BenchmarkId::new(label, TICKS),
            &(fault_rate, traffic),
            |b, &(fault_rate, traffic)| {
                b.iter_batched(
                    || build_config(fault_rate, traffic),
                    |config| {
                        let report = run_simulation(&config).expect("simulation should succeed");
                        black_box(report);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
