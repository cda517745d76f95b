use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use changewatch::host::InMemoryVariables;
use changewatch::{
    evaluate_device_update, ActionSink, DeviceId, DeviceSnapshot, Dispatcher, EngineConfig, FilterLogic,
    Listener, ListenerConfig, ListenerId, VariableStore,
};

/// A device with `n` numeric states.
fn device(n: i64, bump: i64) -> DeviceSnapshot {
    (0..n).fold(DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor"), |dev, i| {
        dev.with_state(format!("state{i}"), i + bump)
    })
}

struct DiscardActions;

impl ActionSink for DiscardActions {
    fn fire_action(&self, listener: ListenerId) {
        black_box(listener);
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let old = device(32, 0);
    // Only state31 changes; the ignore filter covers every other key.
    let new = old.clone().with_state("state31", 1_000);

    let basic = ListenerConfig::new(ListenerId::new(1), "basic", "4.0").watch_device(DeviceId::new(100));
    let ignore = basic
        .clone()
        .advanced(FilterLogic::Ignore, (0..31).map(|i| format!("state{i}")));
    let require = basic.clone().advanced(FilterLogic::Require, ["state31"]);

    let mut group = c.benchmark_group("matcher/evaluate_device_update");
    group.throughput(Throughput::Elements(1));
    group.bench_function("basic", |b| {
        b.iter(|| evaluate_device_update(black_box(&basic), black_box(&old), black_box(&new)));
    });
    group.bench_function("advanced_ignore", |b| {
        b.iter(|| evaluate_device_update(black_box(&ignore), black_box(&old), black_box(&new)));
    });
    group.bench_function("advanced_require", |b| {
        b.iter(|| evaluate_device_update(black_box(&require), black_box(&old), black_box(&new)));
    });
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(
        &EngineConfig::default(),
        Arc::new(InMemoryVariables::new()) as Arc<dyn VariableStore>,
        Arc::new(DiscardActions) as Arc<dyn ActionSink>,
    );
    // 256 listeners, one in sixteen watching the bench device.
    for id in 0..256_u64 {
        let watched = if id % 16 == 0 { 100 } else { 1_000 + id };
        let cfg = ListenerConfig::new(ListenerId::new(id + 1), format!("listener {id}"), "4.0")
            .watch_device(DeviceId::new(watched));
        if let Err(err) = dispatcher.registry().insert(Listener::new(cfg)) {
            panic!("seeding registry: {err}");
        }
    }

    let old = device(8, 0);
    let new = device(8, 1);

    let mut group = c.benchmark_group("matcher/dispatch");
    group.throughput(Throughput::Elements(256));
    group.bench_function("256_listeners", |b| {
        b.iter(|| dispatcher.on_device_updated(black_box(&old), black_box(&new)));
    });
    group.finish();
}

criterion_group!(matcher, bench_evaluate, bench_dispatch);
criterion_main!(matcher);
