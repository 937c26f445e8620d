//! Benchmarks for document chunking
//!
//! Run with: cargo bench -p ragdex-index --bench chunker_bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ragdex_core::WhitespaceCodec;
use ragdex_index::{ChunkerConfig, DocumentChunker};
use std::sync::Arc;

fn generate_text(words: usize) -> String {
  (0..words).map(|i| format!("word{i} ")).collect()
}

fn chunker(chunk_size: usize, overlap: usize) -> DocumentChunker {
  DocumentChunker::new(
    Arc::new(WhitespaceCodec),
    ChunkerConfig {
      chunk_size,
      chunk_overlap: overlap,
      max_chunks: None,
    },
  )
  .unwrap()
}

fn bench_chunk_by_document_size(c: &mut Criterion) {
  let mut group = c.benchmark_group("chunk_by_document_size");
  let chunker = chunker(1000, 200);

  for words in [500, 2_000, 10_000, 50_000].iter() {
    let text = generate_text(*words);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
      b.iter(|| chunker.chunk(black_box(text)));
    });
  }

  group.finish();
}

fn bench_chunk_by_window_size(c: &mut Criterion) {
  let mut group = c.benchmark_group("chunk_by_window_size");
  let text = generate_text(20_000);

  for (chunk_size, overlap) in [(200, 40), (500, 100), (1000, 200), (2000, 400)] {
    let chunker = chunker(chunk_size, overlap);
    group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &text, |b, text| {
      b.iter(|| chunker.chunk(black_box(text)));
    });
  }

  group.finish();
}

fn bench_estimate_chunks(c: &mut Criterion) {
  let chunker = chunker(1000, 200);
  let text = generate_text(20_000);
  let token_count = chunker.estimate_token_count(&text);

  c.bench_function("estimate_chunks", |b| {
    b.iter(|| chunker.estimate_chunks(black_box(token_count)).unwrap());
  });
}

criterion_group!(benches, bench_chunk_by_document_size, bench_chunk_by_window_size, bench_estimate_chunks);
criterion_main!(benches);
