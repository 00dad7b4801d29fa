use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rawnv::header::compute_checksum;
use rawnv::pipeline::{self, WrapOptions};
use rawnv::report::NullReporter;

fn bench_checksum(c: &mut Criterion) {
    let data = vec![0xA5u8; 1024 * 1024];
    c.bench_function("checksum_1mb", |b| b.iter(|| compute_checksum(black_box(&data))));
}

fn bench_wrap_unwrap(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..32 {
        let body = format!("key_{i}=value_{i}\n").repeat(256);
        std::fs::write(dir.path().join(format!("conf_{i:02}")), body).unwrap();
    }

    c.bench_function("wrap_32_files", |b| {
        b.iter(|| pipeline::wrap(black_box(dir.path()), &WrapOptions::default(), &NullReporter).unwrap())
    });

    let container = pipeline::wrap(dir.path(), &WrapOptions::default(), &NullReporter).unwrap();
    c.bench_function("inspect_32_files", |b| {
        b.iter(|| pipeline::inspect(black_box(&container), &NullReporter).unwrap())
    });
}

criterion_group!(benches, bench_checksum, bench_wrap_unwrap);
criterion_main!(benches);
