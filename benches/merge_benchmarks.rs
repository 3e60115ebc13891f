//! Merge throughput: byte concatenation against read-combine-write
//! for JSON-lines piece files

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use piecework::serialize::{merge_files, FileFormat, FileType};
use serde_json::json;
use std::hint::black_box;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write `pieces` JSON-lines files of `records` records each
fn write_pieces(dir: &TempDir, pieces: usize, records: usize) -> Vec<PathBuf> {
    let format = FileFormat::json_lines();
    (0..pieces)
        .map(|piece| {
            let values: Vec<_> = (0..records)
                .map(|i| json!({ "piece": piece, "index": i, "word": format!("word{i}") }))
                .collect();
            let path = dir.path().join(format!("piece_{piece}.jsonl"));
            format.write(&json!(values), &path).unwrap();
            path
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_jsonl");

    for pieces in [4usize, 32] {
        let dir = TempDir::new().unwrap();
        let paths = write_pieces(&dir, pieces, 1_000);
        let merged = dir.path().join("merged.jsonl");

        let fast = FileType::fast(FileFormat::json_lines());
        group.bench_with_input(BenchmarkId::new("fast", pieces), &paths, |b, paths| {
            b.iter(|| merge_files(black_box(paths), &merged, &fast).unwrap())
        });

        let full = FileType::new(FileFormat::json_lines());
        group.bench_with_input(BenchmarkId::new("full", pieces), &paths, |b, paths| {
            b.iter(|| merge_files(black_box(paths), &merged, &full).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
