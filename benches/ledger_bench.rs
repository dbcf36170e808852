//! Benchmarks for the usage ledger write and read paths
//!
//! Run with: cargo bench

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::tempdir;
use usage_ledger::storage::{Codec, XmlCodec};
use usage_ledger::{Accessor, Category, Event, Key, RootRegistry, Storer};

fn instant(day: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(9, minute % 60, 0)
        .unwrap()
}

fn create_test_events(count: usize, identities: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            let day = (i % 28) as u32 + 1;
            let key = Key::command(format!("cmd.{}", i % identities));
            Event::occurrence(key, instant(day, i as u32))
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for identities in [10, 100] {
        let events = create_test_events(1000, identities);
        group.throughput(Throughput::Elements(events.len() as u64));

        group.bench_function(format!("batch_1000_ids_{}", identities), |b| {
            let dir = tempdir().unwrap();
            let registry = RootRegistry::new(dir.path(), "/bench/ws");
            b.iter_batched(
                || (Storer::new(Category::Command, registry.active_root()), events.clone()),
                |(mut storer, events)| storer.insert_batch(black_box(events)).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    let events = create_test_events(1000, 100);

    group.bench_function("month_into_existing", |b| {
        let dir = tempdir().unwrap();
        let registry = RootRegistry::new(dir.path(), "/bench/ws");

        let mut seed = Storer::new(Category::Command, registry.active_root());
        seed.insert_batch(events.clone()).unwrap();
        seed.commit().unwrap();

        b.iter_batched(
            || {
                let mut storer = Storer::new(Category::Command, registry.active_root());
                storer.insert_batch(events.clone()).unwrap();
                storer
            },
            |mut storer| storer.commit().unwrap(),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let dir = tempdir().unwrap();
    let registry = RootRegistry::new(dir.path(), "/bench/ws");
    let mut storer = Storer::new(Category::Command, registry.active_root());
    storer.insert_batch(create_test_events(5000, 200)).unwrap();
    storer.commit().unwrap();

    let path = dir
        .path()
        .join(registry.active_root().name)
        .join("commandEvents-2024-03.xml");

    group.bench_function("read_partition", |b| {
        b.iter(|| XmlCodec.read(Category::Command, black_box(&path)))
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let dir = tempdir().unwrap();
    for workspace in ["/bench/a", "/bench/b", "/bench/c"] {
        let registry = RootRegistry::new(dir.path(), workspace);
        let mut storer = Storer::new(Category::Command, registry.active_root());
        storer.insert_batch(create_test_events(2000, 50)).unwrap();
        storer.commit().unwrap();
    }

    let accessor = Accessor::raw(
        Category::Command,
        Arc::new(RootRegistry::new(dir.path(), "/bench/a")),
    );
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();

    group.bench_function("get_data_month_3_roots", |b| {
        b.iter(|| accessor.get_data(black_box(start), black_box(end)).unwrap())
    });

    group.bench_function("get_totals_month_3_roots", |b| {
        b.iter(|| accessor.get_totals(black_box(start), black_box(end)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_commit, bench_codec, bench_query);
criterion_main!(benches);
