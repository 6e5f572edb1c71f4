//! Key lookup and reindex benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::seq::SliceRandom;
use tempfile::TempDir;
use xbase_bench::utils::{create_table, fill, generate_codes};
use xbase_core::{IndexKind, ReindexScope, TagDef};

/// Exact key searches on a populated tag.
fn bench_find_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_key");

    for count in [1_000usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dir = TempDir::new().unwrap();
            let mut table = create_table(dir.path());
            table
                .create_tag(IndexKind::Mdx, &TagDef::new("CODE", "CODE"), false)
                .unwrap();
            let mut codes = generate_codes(count);
            fill(&mut table, &codes);
            codes.shuffle(&mut rand::thread_rng());

            let mut next = codes.iter().cycle();
            b.iter(|| {
                let code = next.next().unwrap();
                black_box(table.find_key_str(black_box(code)).unwrap());
            });
        });
    }

    group.finish();
}

/// Full walk of a tag in key order.
fn bench_key_walk(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut table = create_table(dir.path());
    table
        .create_tag(IndexKind::Mdx, &TagDef::new("CODE", "CODE"), false)
        .unwrap();
    fill(&mut table, &generate_codes(5_000));

    c.bench_function("key_walk_5000", |b| {
        b.iter(|| {
            let mut seen = 0u32;
            let mut nav = table.get_first_key().unwrap();
            while nav.recno().is_some() {
                seen += 1;
                nav = table.get_next_key().unwrap();
            }
            black_box(seen);
        });
    });
}

/// Rebuild of every tag.
fn bench_reindex(c: &mut Criterion) {
    let mut group = c.benchmark_group("reindex");
    group.sample_size(10);

    let dir = TempDir::new().unwrap();
    let mut table = create_table(dir.path());
    table
        .create_tag(IndexKind::Mdx, &TagDef::new("CODE", "CODE"), false)
        .unwrap();
    table
        .create_tag(IndexKind::Ndx, &TagDef::new("AMT", "AMOUNT"), false)
        .unwrap();
    fill(&mut table, &generate_codes(5_000));

    group.bench_function("two_tags_5000", |b| {
        b.iter(|| table.reindex(black_box(ReindexScope::All)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_find_key, bench_key_walk, bench_reindex);
criterion_main!(benches);
