//! Benchmarks for the Chronicle query front end
//!
//! Run with: cargo bench

use chronicle_ql::query::{parse_query, tokenize};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const SIMPLE: &str = "select value from cpu where time > now() - 1h;";
const COMPLEX: &str = "select host, max(value) as peak, sum(value) / count(*) from cpu, mem \
    where time > now() - 7d and time < now() - 1h and (value > 90 or value < 10) \
    and host != 'backup' group by host, time(1h) order desc limit 100;";

fn wide_query(columns: usize) -> String {
    let select: Vec<String> = (0..columns).map(|i| format!("sum(value{})", i)).collect();
    let filters: Vec<String> = (0..columns).map(|i| format!("value{} > {}", i, i)).collect();
    format!(
        "select {} from t where time > now() - 1d and {};",
        select.join(", "),
        filters.join(" and ")
    )
}

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");

    for (name, query) in [("simple", SIMPLE), ("complex", COMPLEX)] {
        group.throughput(Throughput::Bytes(query.len() as u64));
        group.bench_function(name, |b| b.iter(|| tokenize(black_box(query)).unwrap()));
    }

    group.finish();
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    for size in [10, 100, 400] {
        let query = wide_query(size);
        group.throughput(Throughput::Bytes(query.len() as u64));
        group.bench_function(format!("wide_{}", size), |b| {
            b.iter(|| parse_query(black_box(&query)).unwrap())
        });
    }

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    let query = parse_query(COMPLEX).unwrap();

    group.bench_function("time_range", |b| b.iter(|| black_box(&query).time_range().unwrap()));
    group.bench_function("where_condition", |b| {
        b.iter(|| black_box(&query).where_condition().unwrap())
    });
    group.bench_function("referenced_columns", |b| {
        b.iter(|| black_box(&query).referenced_columns())
    });

    group.finish();
}

criterion_group!(benches, bench_lexer, bench_parser, bench_analysis);
criterion_main!(benches);
