// Criterion benchmarks for tether-server
//
// Run benchmarks with:
//   cargo bench -p tether-server
//
// For detailed output with plots:
//   cargo bench -p tether-server -- --save-baseline main

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_common::protocol::{CallRequest, Interface};
use tether_server::{bind, Dispatcher, MethodTable, SelectionPolicy, ServiceInterface, ServiceRegistry, WeightTable};

fn weights(count: usize) -> Vec<(String, u32)> {
    (0..count).map(|i| (format!("service{}", i), (i % 4) as u32)).collect()
}

fn bench_weight_table_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("weight_table_creation");

    for count in [2, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let weights = weights(count);
            b.iter(|| WeightTable::with_seed(black_box(weights.clone()), 1));
        });
    }

    group.finish();
}

fn bench_weighted_draws(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_draws");

    group.bench_function("10_services_100_draws", |b| {
        let mut table = WeightTable::with_seed(weights(10), 1);
        b.iter(|| {
            for _ in 0..100 {
                black_box(table.next());
            }
        });
    });

    group.finish();
}

pub trait Counter: Send + Sync {
    fn bump(&self, by: i64) -> i64;
}

impl Interface for dyn Counter {
    const ID: &'static str = "bench.Counter";
}

impl ServiceInterface for dyn Counter {
    fn method_table() -> MethodTable<Self> {
        MethodTable::new(Self::ID).method("bump", |s, (by,): (i64,)| s.bump(by))
    }
}

struct Fixed(i64);

impl Counter for Fixed {
    fn bump(&self, by: i64) -> i64 {
        self.0 + by
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for (label, policy, count) in [
        ("strict_single", SelectionPolicy::Strict, 1),
        ("weighted_four", SelectionPolicy::Weighted, 4),
    ] {
        let registry = Arc::new(ServiceRegistry::new(policy));
        for i in 0..count {
            let target: Arc<dyn Counter> = Arc::new(Fixed(i));
            registry.register(format!("counter{}", i), 1, bind(target));
        }
        let dispatcher = Dispatcher::new(registry);
        let request = CallRequest::for_call::<dyn Counter, _>("bump", (5i64,)).unwrap();

        group.bench_function(label, |b| {
            b.iter(|| black_box(dispatcher.dispatch(black_box(request.clone()))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_weight_table_creation,
    bench_weighted_draws,
    bench_dispatch
);
criterion_main!(benches);
