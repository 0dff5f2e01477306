//! Pipeline throughput benchmarks.
//!
//! Pushes a square of chunk positions through the pipeline and waits for
//! every handle:
//! - **independent**: single-chunk stages only
//! - **neighborhood**: a light-merging style stage that reads the 3x3x3
//!   neighborhood, borrowed from in-flight records or the ready store
//!
//! Chunks carry a small payload so stage work is not free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chunk_pipeline::{
  neighborhood, Chunk, ChunkProcessingPipeline, Fifo, NearestFirst, PipelineConfig, Position,
  Stage, TaskPriority,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::IVec3;

// =============================================================================
// Bench chunk
// =============================================================================

struct BenchChunk {
  position: Position,
  light: AtomicU64,
}

impl BenchChunk {
  fn generate(position: Position) -> Arc<Self> {
    let seed = (position.x as u64)
      .wrapping_mul(73_856_093)
      .wrapping_add((position.z as u64).wrapping_mul(83_492_791));
    Arc::new(Self {
      position,
      light: AtomicU64::new(seed),
    })
  }

  /// A few hundred cycles of busy work standing in for lighting.
  fn churn(&self) {
    let mut value = self.light.load(Ordering::Relaxed);
    for _ in 0..256 {
      value = value.rotate_left(5) ^ 0x9E37_79B9_7F4A_7C15;
    }
    self.light.store(black_box(value), Ordering::Relaxed);
  }
}

impl Chunk for BenchChunk {
  fn position(&self) -> Position {
    self.position
  }

  fn dispose(&self) {}
}

fn no_lookup(_: Position) -> Option<Arc<BenchChunk>> {
  None
}

// =============================================================================
// Pipelines
// =============================================================================

fn positions(side: i32) -> Vec<Position> {
  (0..side)
    .flat_map(|x| (0..side).map(move |z| IVec3::new(x, 0, z)))
    .collect()
}

fn independent_pipeline<P: TaskPriority>(priority: P) -> ChunkProcessingPipeline<BenchChunk> {
  let pipeline =
    ChunkProcessingPipeline::new(PipelineConfig::default(), no_lookup, priority).unwrap();
  pipeline
    .add_stage(Stage::single("Chunk generate internal lighting", |chunk: Arc<BenchChunk>| {
      chunk.churn();
      Ok(chunk)
    }))
    .add_stage(Stage::single("Chunk deflate", |chunk: Arc<BenchChunk>| {
      chunk.churn();
      Ok(chunk)
    }));
  pipeline
}

type ReadyChunks = Arc<Mutex<HashMap<Position, Arc<BenchChunk>>>>;

/// Light merging reads the 3x3x3 neighborhood, clamped to the square.
/// Finished chunks go to `ready` from the last stage, so later neighbors
/// find them through the lookup once their records are gone.
fn neighborhood_pipeline(side: i32) -> (ChunkProcessingPipeline<BenchChunk>, ReadyChunks) {
  let ready = ReadyChunks::default();
  let lookup = {
    let ready = Arc::clone(&ready);
    move |pos: Position| ready.lock().unwrap().get(&pos).cloned()
  };

  let pipeline = ChunkProcessingPipeline::new(PipelineConfig::default(), lookup, Fifo).unwrap();
  let publish = Arc::clone(&ready);
  pipeline
    .add_stage(Stage::single("Chunk generate internal lighting", |chunk: Arc<BenchChunk>| {
      chunk.churn();
      Ok(chunk)
    }))
    .add_stage(Stage::multi(
      "Light merging",
      |chunks: &[Arc<BenchChunk>]| {
        let own = Arc::clone(&chunks[chunks.len() / 2]);
        let merged = chunks
          .iter()
          .fold(0u64, |acc, c| acc ^ c.light.load(Ordering::Relaxed));
        own.light.store(merged, Ordering::Relaxed);
        Ok(own)
      },
      move |pos| {
        neighborhood(pos, 1)
          .into_iter()
          .map(|p| p.clamp(IVec3::ZERO, IVec3::new(side - 1, 0, side - 1)))
          .collect()
      },
    ))
    .add_stage(Stage::single("Chunk ready", move |chunk: Arc<BenchChunk>| {
      publish
        .lock()
        .unwrap()
        .insert(chunk.position, Arc::clone(&chunk));
      Ok(chunk)
    }));
  (pipeline, ready)
}

fn run_all(pipeline: &ChunkProcessingPipeline<BenchChunk>, positions: &[Position]) {
  let handles: Vec<_> = positions
    .iter()
    .map(|&pos| pipeline.invoke_generator_task(pos, move || Ok(BenchChunk::generate(pos))))
    .collect();
  for handle in handles {
    black_box(handle.get_timeout(Duration::from_secs(30)).unwrap());
  }
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_independent(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/independent");
  for side in [8, 16, 32] {
    let positions = positions(side);
    group.bench_with_input(BenchmarkId::new("fifo", side * side), &positions, |b, positions| {
      let pipeline = independent_pipeline(Fifo);
      b.iter(|| run_all(&pipeline, positions));
    });
    group.bench_with_input(
      BenchmarkId::new("nearest_first", side * side),
      &positions,
      |b, positions| {
        let pipeline = independent_pipeline(NearestFirst::new(IVec3::splat(side / 2)));
        b.iter(|| run_all(&pipeline, positions));
      },
    );
  }
  group.finish();
}

fn bench_neighborhood(c: &mut Criterion) {
  let mut group = c.benchmark_group("pipeline/neighborhood");
  for side in [8, 16] {
    let positions = positions(side);
    group.bench_with_input(BenchmarkId::from_parameter(side * side), &positions, |b, positions| {
      let (pipeline, ready) = neighborhood_pipeline(side);
      b.iter(|| {
        ready.lock().unwrap().clear();
        run_all(&pipeline, positions);
      });
    });
  }
  group.finish();
}

criterion_group!(benches, bench_independent, bench_neighborhood);
criterion_main!(benches);
