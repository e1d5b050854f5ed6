use criterion::{black_box, BatchSize, BenchmarkId, Criterion, Throughput};
use criterion::{criterion_group, criterion_main};
use tempfile::tempdir;

use bucketfile::{ChunkWriter, FileOutputConfig, MemoryChunk};

const WRITES_PER_ITER: usize = 100;

fn bench_write_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_chunk");
    for &size in &[4 * 1024_usize, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes((size * WRITES_PER_ITER) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = tempdir().expect("tempdir");
                    let mut config = FileOutputConfig::new(
                        dir.path().join("bench.*.log").to_str().expect("utf8 path"),
                    );
                    config.localtime = false;
                    let writer = ChunkWriter::from_config(&config.resolve().expect("resolve"));
                    let chunk = MemoryChunk::with_data("20240615", vec![b'x'; size]);
                    (dir, writer, chunk)
                },
                |(_dir, writer, chunk)| {
                    for _ in 0..WRITES_PER_ITER {
                        writer.write(black_box(&chunk)).expect("write");
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let mut config =
        FileOutputConfig::new(dir.path().join("probe.*.log").to_str().expect("utf8 path"));
    config.localtime = false;
    let writer = ChunkWriter::from_config(&config.resolve().expect("resolve"));
    for _ in 0..256 {
        writer
            .write(&MemoryChunk::with_data("20240615", "x"))
            .expect("seed");
    }

    c.bench_function("allocate_past_256", |b| {
        b.iter(|| {
            writer
                .allocator()
                .allocate(black_box("20240615"), "")
                .expect("allocate")
        })
    });
}

criterion_group!(benches, bench_write_chunk, bench_allocate);
criterion_main!(benches);
