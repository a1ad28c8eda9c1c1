//! Benchmarks for pipeline throughput
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowbus::{Bus, BusConfig, Keep, Runtime, SchedulerSettings, Stage, Value};
use std::rc::Rc;

fn manual_runtime() -> Runtime {
    let config = BusConfig {
        scheduler: SchedulerSettings::manual(),
        ..BusConfig::default()
    };
    Runtime::manual(config).0
}

fn bench_linear_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_chain");
    group.throughput(Throughput::Elements(1));

    for depth in [1usize, 4, 16].iter() {
        let rt = manual_runtime();
        let source = rt.stage();
        let mut bus = Bus::from_stage(Rc::clone(&source));
        for _ in 0..*depth {
            bus.transform(|v, _, _| v.as_int().unwrap_or_default() + 1)
                .expect("open bus accepts transform");
        }

        group.bench_with_input(BenchmarkId::new("transform", depth), depth, |b, _| {
            b.iter(|| source.accept(black_box(Value::Int(1)), None))
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [2usize, 8, 32].iter() {
        let rt = manual_runtime();
        let source = rt.stage();
        let mut forks = Vec::new();
        let mut bus = Bus::from_stage(Rc::clone(&source));
        for _ in 0..*width {
            forks.push(bus.fork().expect("open bus forks"));
        }

        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::new("fork", width), width, |b, _| {
            b.iter(|| source.accept(black_box(Value::Int(1)), Some("tick".into())))
        });
    }

    group.finish();
}

fn bench_keep_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("keep_policies");
    group.throughput(Throughput::Elements(1));

    for (label, keep) in [
        ("last_0", Keep::Last(0)),
        ("last_16", Keep::Last(16)),
        ("first_16", Keep::First(16)),
    ] {
        let rt = manual_runtime();
        let stage = Stage::with_operator(&rt, flowbus::Operator::Keep(keep));
        group.bench_function(label, |b| {
            b.iter(|| stage.accept(black_box(Value::Int(7)), None))
        });
    }

    group.finish();
}

fn bench_batch_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_flush");

    for burst in [10usize, 100, 1000].iter() {
        let rt = manual_runtime();
        let source = rt.stage();
        let mut bus = Bus::from_stage(Rc::clone(&source));
        bus.group()
            .and_then(|b| b.last(0))
            .and_then(|b| b.batch())
            .expect("group sentence is valid");

        group.throughput(Throughput::Elements(*burst as u64));
        group.bench_with_input(BenchmarkId::new("group_last_batch", burst), burst, |b, &burst| {
            b.iter(|| {
                for i in 0..burst {
                    let key = if i % 2 == 0 { "even" } else { "odd" };
                    source
                        .accept(Value::Int(i as i64), Some(key.to_string()))
                        .expect("accept");
                }
                rt.flush().expect("flush settles")
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_linear_chain,
    bench_fan_out,
    bench_keep_policies,
    bench_batch_flush,
);
criterion_main!(benches);
