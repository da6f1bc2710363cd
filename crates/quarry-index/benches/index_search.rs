use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quarry_index::VectorIndex;
use quarry_ingest::{Chunk, Segment};
use quarry_llm::{Embedding, EmbeddingSpace};

const DIMENSIONS: usize = 384;

// xorshift64, seeded per chunk
fn pseudo_vector(seed: u64) -> Embedding {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let values = (0..DIMENSIONS)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            #[allow(clippy::cast_precision_loss)]
            let unit = (state % 10_000) as f32 / 10_000.0;
            unit - 0.5
        })
        .collect();
    Embedding::normalized(values).unwrap()
}

fn space() -> EmbeddingSpace {
    EmbeddingSpace::new("bench", "pseudo", DIMENSIONS)
}

fn build_index(size: usize) -> VectorIndex {
    let segment = Arc::new(Segment::text("benchmark corpus", "bench"));
    let items = (0..size).map(|i| {
        let chunk = Chunk {
            text: format!("chunk {i}"),
            parent_segment: Arc::clone(&segment),
            index: i,
        };
        (chunk, pseudo_vector(i as u64 + 1))
    });
    VectorIndex::build(space(), items).unwrap()
}

fn search(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_index_search");
    let query = pseudo_vector(u64::MAX);
    let query_space = space();

    for size in [100, 1_000, 10_000] {
        let index = build_index(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("top_3", size), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), &query_space, black_box(3)));
        });
    }

    group.finish();
}

fn top_k_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_index_top_k");
    let index = build_index(5_000);
    let query = pseudo_vector(7);
    let query_space = space();

    for top_k in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("k", top_k), &top_k, |b, &top_k| {
            b.iter(|| index.search(black_box(&query), &query_space, top_k));
        });
    }

    group.finish();
}

criterion_group!(benches, search, top_k_scaling);
criterion_main!(benches);
