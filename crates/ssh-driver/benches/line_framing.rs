//! Line framing and decoding benchmarks.
#![allow(missing_docs)]

use std::collections::VecDeque;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ssh_driver::{Encoding, LineBuffer};

fn sample_output(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..lines {
        out.extend_from_slice(format!("  {i:>6} drwxr-xr-x root root /var/lib/thing-{i}  \n").as_bytes());
    }
    out
}

fn bench_chunk_sizes(c: &mut Criterion) {
    let data = sample_output(2_000);
    let mut group = c.benchmark_group("line_framing_chunk");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for size in &[64, 1024, 16 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut buffer = LineBuffer::new();
                let mut lines = VecDeque::new();
                for chunk in data.chunks(size) {
                    buffer.push(black_box(chunk), &mut lines);
                }
                lines.extend(buffer.finish());
                lines.len()
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let line = "total 48 -rw-r--r-- 1 deploy deploy 1337 Oct 17 12:00 café.log".as_bytes();
    let mut group = c.benchmark_group("decode_line");

    for encoding in [Encoding::Utf8, Encoding::Utf8Escaped, Encoding::Latin1] {
        group.bench_function(encoding.label(), |b| {
            b.iter(|| encoding.decode(black_box(line)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_sizes, bench_decode);
criterion_main!(benches);
