use std::hint::black_box;

use bond_core::ao3::parser::{parse_series, parse_work};
use criterion::{Criterion, criterion_group, criterion_main};

const WORK_PAGE: &str = include_str!("../tests/fixtures/work.html");
const SERIES_PAGE: &str = include_str!("../tests/fixtures/series.html");

fn benchmark_work_page(c: &mut Criterion) {
	c.bench_function("parse_work", |b| {
		b.iter(|| parse_work(black_box(WORK_PAGE), black_box(1_234_567)));
	});
}

fn benchmark_series_page(c: &mut Criterion) {
	c.bench_function("parse_series", |b| {
		b.iter(|| parse_series(black_box(SERIES_PAGE), black_box(998_877)));
	});
}

criterion_group!(benches, benchmark_work_page, benchmark_series_page);
criterion_main!(benches);
