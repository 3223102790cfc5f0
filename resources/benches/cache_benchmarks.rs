use criterion::{Criterion, black_box, criterion_group, criterion_main};
use redlilium_resources::{MemoryBackend, Resources};

fn populated(count: usize) -> Resources {
    let memory = MemoryBackend::new();
    for i in 0..count {
        memory.insert(format!("item{i}"), i as u64);
    }
    let resources = Resources::new();
    resources.register("mem", memory);
    resources
}

fn bench_cache_hit(c: &mut Criterion) {
    let resources = populated(1);
    let _warm = resources.load::<u64>("mem://item0");

    c.bench_function("load_cache_hit", |b| {
        b.iter(|| {
            let value = resources.load::<u64>(black_box("mem://item0"));
            let _ = resources.unload::<u64>("mem://item0");
            value
        })
    });
}

fn bench_load_sweep_cycle(c: &mut Criterion) {
    let resources = populated(256);
    let paths: Vec<String> = (0..256).map(|i| format!("mem://item{i}")).collect();

    c.bench_function("load_unload_sweep_256", |b| {
        b.iter(|| {
            for path in &paths {
                let _ = resources.load::<u64>(path);
                let _ = resources.unload::<u64>(path);
            }
            resources.unload_unused()
        })
    });
}

fn bench_async_single_flight(c: &mut Criterion) {
    let resources = populated(1);

    c.bench_function("load_async_16_joiners", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..16)
                .filter_map(|_| resources.load_async::<u64>("mem://item0").ok())
                .collect();
            resources.run_until_idle();
            for _ in &handles {
                let _ = resources.unload_now::<u64>("mem://item0");
            }
            handles.len()
        })
    });
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_load_sweep_cycle,
    bench_async_single_flight
);
criterion_main!(benches);
