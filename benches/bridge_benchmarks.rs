//! Benchmarks for the bridge hot paths: pushing entities, deduplicating
//! repeat pushes, pulling typed entities, and member dispatch.
//!
//! ```bash
//! cargo bench --bench bridge_benchmarks
//! ```

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use objbridge::prelude::*;
use std::hint::black_box;

struct Body {
    label: String,
}

impl Wrappable for Body {
    const CLASS: &'static str = "Body";
}

struct Planet {
    body: Body,
    radius: f64,
}

impl Wrappable for Planet {
    const CLASS: &'static str = "Planet";
}

fn bridge() -> Bridge {
    let mut registry = BridgeRegistry::new();
    registry
        .create_class(
            ClassBuilder::for_type::<Body>()
                .method_ref("GetLabel", |b: &Body| b.label.clone())
                .build(),
        )
        .unwrap();
    registry
        .create_class(
            ClassBuilder::for_type::<Planet>()
                .parent("Body")
                .method_ref("GetRadius", |p: &Planet| p.radius)
                .build(),
        )
        .unwrap();
    registry
        .register_upcast::<Planet, Body>(|p| &p.body, |p| &mut p.body)
        .unwrap();
    registry
        .register_promotion("Body", "Planet", downcast_test::<Planet>())
        .unwrap();
    Bridge::with_defaults(registry)
}

fn planet(i: usize) -> Planet {
    Planet {
        body: Body {
            label: format!("planet-{i}"),
        },
        radius: i as f64,
    }
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");
    let bridge = bridge();

    group.bench_function("exclusive_new", |b| {
        b.iter_batched(
            || Native::new(planet(1)),
            |native| {
                let proxy = bridge.wrap_exclusive(&native).unwrap();
                black_box(proxy);
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("exclusive_promoted", |b| {
        b.iter_batched(
            || Native::new(planet(2)),
            |native| {
                let proxy = bridge.wrap_exclusive_as(&native, "Body").unwrap();
                black_box(proxy);
            },
            BatchSize::SmallInput,
        )
    });

    let earth = Native::new(planet(3));
    bridge.wrap_exclusive(&earth).unwrap();
    group.bench_function("exclusive_dedup", |b| {
        b.iter(|| black_box(bridge.wrap_exclusive(black_box(&earth)).unwrap()))
    });

    group.finish();
}

fn bench_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull");
    let bridge = bridge();
    let earth = Native::new(planet(4));
    let mut stack = ScriptStack::new();
    bridge.push_exclusive(&mut stack, &earth).unwrap();

    group.bench_function("check_from_script", |b| {
        b.iter(|| black_box(bridge.check_from_script(&stack, -1, "Body").unwrap()))
    });

    group.bench_function("check_typed_upcast", |b| {
        b.iter(|| {
            let body = bridge.check::<Body>(&stack, -1).unwrap();
            black_box(body.with(|b| b.label.len()).unwrap())
        })
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let bridge = bridge();
    let earth = Native::new(planet(5));
    let obj = Value::Object(bridge.wrap_exclusive(&earth).unwrap());

    group.bench_function("own_method", |b| {
        b.iter(|| black_box(bridge.call_method(&obj, "GetRadius", vec![]).unwrap()))
    });

    group.bench_function("inherited_method", |b| {
        b.iter(|| black_box(bridge.call_method(&obj, "GetLabel", vec![]).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_pull, bench_dispatch);
criterion_main!(benches);
