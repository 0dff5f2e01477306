//! ChunkProcessingPipeline - the public entry point.
//!
//! Callers register stages, submit positions, and get back a
//! [`ChunkFuture`] per position. All state transitions happen on the reactor
//! thread; the methods here only create or remove records and never block on
//! task execution.
//!
//! ```ignore
//! let pipeline = ChunkProcessingPipeline::new(PipelineConfig::default(), store.clone(), Fifo)?;
//! pipeline
//!   .add_stage(Stage::single("Chunk deflate", deflate))
//!   .add_stage(Stage::inspect("Chunk ready", move |chunk| store.insert(chunk)));
//!
//! let handle = pipeline.invoke_generator_task(pos, move || Ok(generator.generate(pos)));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use super::reactor::{self, Shared};
use super::record::{ProcessingRecord, ProcessingState};
use super::stage::{ChunkTask, Stage, TaskResult};
use crate::chunk::{Chunk, ChunkLookup};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::executor::CompletionExecutor;
use crate::handle::ChunkFuture;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::position::Position;
use crate::priority::TaskPriority;
use crate::sync::{lock, read, write};

/// Multi-stage, dependency-aware chunk processing pipeline.
pub struct ChunkProcessingPipeline<C: Chunk> {
  shared: Arc<Shared<C>>,
  reactor: Mutex<Option<JoinHandle<()>>>,
  config: PipelineConfig,
}

impl<C: Chunk> ChunkProcessingPipeline<C> {
  /// Start the worker pool and the reactor thread.
  ///
  /// `lookup` is the store of chunks that have left the pipeline; `priority`
  /// orders both pending work and completions.
  pub fn new<L, P>(config: PipelineConfig, lookup: L, priority: P) -> Result<Self>
  where
    L: ChunkLookup<C> + 'static,
    P: TaskPriority,
  {
    config.validate()?;

    let metrics = Arc::new(PipelineMetrics::new());
    let executor = CompletionExecutor::new(&config, Arc::new(priority), Arc::clone(&metrics))?;
    let shared = Arc::new(Shared {
      stages: RwLock::new(Vec::new()),
      records: Mutex::new(HashMap::new()),
      executor,
      lookup: Box::new(lookup),
      metrics,
    });

    let reactor = {
      let shared = Arc::clone(&shared);
      thread::Builder::new()
        .name(config.reactor_name.clone())
        .spawn(move || reactor::run(shared))
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?
    };

    tracing::debug!(
      workers = config.worker_threads,
      queue_capacity = config.queue_capacity,
      "chunk processing pipeline started"
    );

    Ok(Self {
      shared,
      reactor: Mutex::new(Some(reactor)),
      config,
    })
  }

  /// Append a stage. Registration order is execution order.
  ///
  /// Register every stage before submitting work; a stage added while
  /// positions are in flight is seen by them in an unspecified way.
  pub fn add_stage(&self, stage: Stage<C>) -> &Self {
    write(&self.shared.stages).push(Arc::new(stage));
    self
  }

  /// Process a new position, starting with `supplier` (generation or
  /// loading), then every registered stage.
  ///
  /// If the position is already being processed, its existing handle is
  /// returned and no new work starts. After [`shutdown`](Self::shutdown)
  /// the returned handle is already failed with [`PipelineError::ShutDown`].
  ///
  /// # Panics
  ///
  /// Panics if no stage has been registered.
  pub fn invoke_generator_task<F>(&self, position: Position, supplier: F) -> ChunkFuture<C>
  where
    F: Fn() -> TaskResult<C> + Send + Sync + 'static,
  {
    assert!(
      !read(&self.shared.stages).is_empty(),
      "ChunkProcessingPipeline must have at least one stage"
    );
    if self.shared.executor.is_shutdown() {
      return ChunkFuture::ready(position, Err(PipelineError::ShutDown));
    }

    let mut records = lock(&self.shared.records);
    if let Some(record) = records.get(&position) {
      return record.external().clone();
    }

    let mut record = ProcessingRecord::new(ChunkTask::generator(position, supplier));
    let external = record.external().clone();

    if let Some(work) = record.task().map(|task| task.bind(Vec::new())) {
      match self.shared.executor.submit(position, work) {
        Ok(handle) => record.set_in_flight(handle),
        // Left waiting; the reactor retries it on its next pass.
        Err(PipelineError::QueueFull { .. }) => {}
        Err(error) => return ChunkFuture::ready(position, Err(error)),
      }
    }

    // A caller cancelling the handle needs a pass to release the record.
    let shared = Arc::downgrade(&self.shared);
    external.on_complete(move |outcome| {
      if matches!(outcome, Err(PipelineError::Cancelled { .. })) {
        if let Some(shared) = shared.upgrade() {
          shared.executor.wake();
        }
      }
    });

    records.insert(position, record);
    tracing::trace!(%position, "chunk submitted");
    external
  }

  /// Re-enter an already materialized chunk at the first stage.
  pub fn invoke_pipeline(&self, chunk: Arc<C>) -> ChunkFuture<C> {
    let position = chunk.position();
    self.invoke_generator_task(position, move || Ok(Arc::clone(&chunk)))
  }

  /// Stop processing `position`: cancel its handle and in-flight task and
  /// dispose the chunk it holds. No-op if the position is not processing.
  ///
  /// Does not wait for a running task to stop; its result is discarded.
  pub fn stop_processing_at(&self, position: Position) {
    let removed = lock(&self.shared.records).remove(&position);
    if let Some(record) = removed {
      tracing::debug!(%position, "chunk processing stopped");
      self.shared.metrics.record_cancelled();
      record.stop();
    }
  }

  pub fn is_position_processing(&self, position: Position) -> bool {
    lock(&self.shared.records).contains_key(&position)
  }

  /// Snapshot of the positions currently in the pipeline.
  pub fn processing_positions(&self) -> Vec<Position> {
    lock(&self.shared.records).keys().copied().collect()
  }

  pub fn processing_count(&self) -> usize {
    lock(&self.shared.records).len()
  }

  pub fn stage_names(&self) -> Vec<String> {
    read(&self.shared.stages)
      .iter()
      .map(|stage| stage.name().to_string())
      .collect()
  }

  /// Where `position` is in the pipeline, if it is processing.
  pub fn processing_state(&self, position: Position) -> Option<ProcessingState> {
    let stages = read(&self.shared.stages);
    let records = lock(&self.shared.records);
    records.get(&position).map(|record| record.state(&stages))
  }

  /// Re-check every waiting position without a completion event, e.g. after
  /// publishing a chunk to the lookup from outside the pipeline.
  pub fn request_rescan(&self) {
    self.shared.executor.wake();
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Stop accepting work, cancel every position, drop queued tasks and stop
  /// the reactor. Idempotent.
  pub fn shutdown(&self) {
    self.shared.executor.shutdown();
    let drained = self.shared.drain();
    if !drained.is_empty() {
      tracing::debug!(count = drained.len(), "cancelling chunk processing on shutdown");
    }
    for record in drained {
      record.stop();
    }

    let reactor = lock(&self.reactor).take();
    if let Some(reactor) = reactor {
      // A completion callback may shut the pipeline down from the reactor.
      if reactor.thread().id() != thread::current().id() && reactor.join().is_err() {
        tracing::error!("chunk processing reactor panicked");
      }
    }
  }

  /// Cancel every position and drop queued tasks, keeping the workers and
  /// the reactor running for new submissions.
  pub fn restart(&self) {
    // Clear before draining: a job queued in between belongs to a record
    // the drain still sees.
    let dropped = self.shared.executor.clear_pending();
    let drained = self.shared.drain();
    tracing::debug!(
      cancelled = drained.len(),
      dropped,
      "chunk processing pipeline restarted"
    );
    for record in drained {
      record.stop();
    }
  }
}

impl<C: Chunk> Drop for ChunkProcessingPipeline<C> {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
#[path = "processing_test.rs"]
mod processing_test;
