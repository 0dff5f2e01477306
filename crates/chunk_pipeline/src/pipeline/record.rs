//! ProcessingRecord - per-position pipeline progress.
//!
//! Records are created by the facade and mutated only by the reactor (and by
//! the facade while removing them). At most one task is in flight per record.

use std::sync::Arc;

use super::stage::{ChunkTask, Stage, GENERATION_STAGE_NAME};
use crate::chunk::Chunk;
use crate::error::PipelineError;
use crate::executor::TaskHandle;
use crate::handle::ChunkFuture;
use crate::position::Position;

/// Where a position currently is in the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessingState {
  /// The initial supplier has not finished yet.
  Generating,
  /// Running or waiting to run the stage at `index`.
  Stage { index: usize, name: String },
}

pub(crate) struct ProcessingRecord<C> {
  position: Position,
  /// `None` until the initial supplier finishes.
  stage: Option<usize>,
  /// Memoized task for the current stage; cleared once it completes.
  task: Option<ChunkTask<C>>,
  in_flight: Option<TaskHandle>,
  chunk: Option<Arc<C>>,
  external: ChunkFuture<C>,
}

impl<C: Chunk> ProcessingRecord<C> {
  /// Record whose first task is `generator`.
  pub fn new(generator: ChunkTask<C>) -> Self {
    let position = generator.position();
    Self {
      position,
      stage: None,
      task: Some(generator),
      in_flight: None,
      chunk: None,
      external: ChunkFuture::new(position),
    }
  }

  pub fn position(&self) -> Position {
    self.position
  }

  pub fn stage(&self) -> Option<usize> {
    self.stage
  }

  pub fn chunk(&self) -> Option<&Arc<C>> {
    self.chunk.as_ref()
  }

  pub fn external(&self) -> &ChunkFuture<C> {
    &self.external
  }

  pub fn task(&self) -> Option<&ChunkTask<C>> {
    self.task.as_ref()
  }

  pub fn in_flight(&self) -> Option<&TaskHandle> {
    self.in_flight.as_ref()
  }

  /// A task is built and not yet submitted.
  pub fn is_waiting(&self) -> bool {
    self.task.is_some() && self.in_flight.is_none()
  }

  pub fn set_in_flight(&mut self, handle: TaskHandle) {
    debug_assert!(
      self.in_flight.is_none(),
      "second task in flight for {}",
      self.position
    );
    self.in_flight = Some(handle);
  }

  /// Keep the task but allow it to be submitted again.
  pub fn clear_in_flight(&mut self) {
    self.in_flight = None;
  }

  /// Forget the finished task so the next stage builds a fresh one.
  pub fn reset_task_state(&mut self) {
    self.task = None;
    self.in_flight = None;
  }

  pub fn set_chunk(&mut self, chunk: Arc<C>) {
    self.chunk = Some(chunk);
  }

  pub fn has_next_stage(&self, stage_count: usize) -> bool {
    self.stage.map_or(0, |index| index + 1) < stage_count
  }

  /// Advance to the next stage index and return it.
  pub fn next_stage(&mut self) -> usize {
    let next = self.stage.map_or(0, |index| index + 1);
    self.stage = Some(next);
    next
  }

  /// Build and memoize the current stage's task if there is none.
  pub fn make_task(&mut self, stages: &[Arc<Stage<C>>]) {
    if self.task.is_some() {
      return;
    }
    if let Some(stage) = self.stage.and_then(|index| stages.get(index)) {
      self.task = Some(stage.make_task(self.position));
    }
  }

  pub fn stage_name(&self, stages: &[Arc<Stage<C>>]) -> String {
    match self.stage.and_then(|index| stages.get(index)) {
      Some(stage) => stage.name().to_string(),
      None => GENERATION_STAGE_NAME.to_string(),
    }
  }

  pub fn state(&self, stages: &[Arc<Stage<C>>]) -> ProcessingState {
    match self.stage {
      None => ProcessingState::Generating,
      Some(index) => ProcessingState::Stage {
        index,
        name: self.stage_name(stages),
      },
    }
  }

  /// Cancel everything held for this position. Call after removing the
  /// record from the live set, outside any pipeline lock.
  pub fn stop(self) {
    self.external.cancel();
    if let Some(in_flight) = &self.in_flight {
      in_flight.cancel();
    }
    if let Some(chunk) = &self.chunk {
      chunk.dispose();
    }
  }

  /// Fail the external handle and release the held chunk.
  pub fn fail(self, error: PipelineError) {
    if let Some(chunk) = &self.chunk {
      chunk.dispose();
    }
    self.external.fail(error);
  }

  /// Resolve the external handle with the final chunk. A handle the caller
  /// already cancelled gets nothing and the chunk is disposed instead.
  pub fn finish(self) {
    if let Some(chunk) = self.chunk {
      if !self.external.resolve(Arc::clone(&chunk)) {
        chunk.dispose();
      }
    }
  }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
