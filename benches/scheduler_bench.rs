use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use flow_scheduler::metrics::{calculate_95th_percentile, jain_fairness};
use flow_scheduler::traffic::generate_network_traffic;
use flow_scheduler::{Flow, MlfqScheduler, WrrScheduler};

fn workload() -> Vec<Flow> {
    generate_network_traffic(20, &[3, 2, 1, 2, 1])
}

fn bench_mlfq_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("mlfq_scheduler");
    let flows = workload();

    group.bench_function("add_packet", |b| {
        let mut scheduler = MlfqScheduler::default();
        let flow = &flows[0];
        let packet = flow.packets[0].clone();
        b.iter(|| {
            scheduler.add_packet(black_box(flow), packet.clone());
            black_box(scheduler.schedule());
        });
    });

    group.bench_function("drain_workload", |b| {
        b.iter_batched(
            || {
                let mut scheduler = MlfqScheduler::default();
                for flow in &flows {
                    for packet in &flow.packets {
                        scheduler.add_packet(flow, packet.clone());
                    }
                }
                scheduler
            },
            |mut scheduler| {
                while scheduler.has_packets() {
                    black_box(scheduler.schedule());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_wrr_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrr_scheduler");
    let flows = workload();

    group.bench_function("drain_workload", |b| {
        b.iter_batched(
            || {
                let mut scheduler = WrrScheduler::new(&flows);
                for flow in &flows {
                    for packet in &flow.packets {
                        scheduler.add_packet(&flow.id, packet.clone());
                    }
                }
                scheduler
            },
            |mut scheduler| {
                while scheduler.has_packets() {
                    black_box(scheduler.schedule());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");
    let samples: Vec<f64> = (0..10_000).map(|i| ((i * 7919) % 10_007) as f64).collect();

    group.bench_function("jain_fairness", |b| {
        b.iter(|| jain_fairness(black_box(&samples)));
    });

    group.bench_function("p95", |b| {
        b.iter(|| calculate_95th_percentile(black_box(&samples)));
    });
}

criterion_group!(
    benches,
    bench_mlfq_scheduler,
    bench_wrr_scheduler,
    bench_metrics
);
criterion_main!(benches);
