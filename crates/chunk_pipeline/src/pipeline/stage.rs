//! Stages and the tasks they produce.
//!
//! A [`Stage`] is a named factory: given a position it builds a fresh
//! [`ChunkTask`] declaring which positions' chunks it reads and how it turns
//! them into the chunk for its own position.
//!
//! ```ignore
//! pipeline
//!   .add_stage(Stage::single("Chunk generate internal lighting", |chunk| {
//!     chunk.light_internal();
//!     Ok(chunk)
//!   }))
//!   .add_stage(Stage::multi(
//!     "Light merging",
//!     |chunks| merge_light(chunks),
//!     |pos| neighborhood(pos, 1),
//!   ))
//!   .add_stage(Stage::inspect("Chunk ready", move |chunk| ready.push(chunk.position())));
//! ```

use std::sync::Arc;

use smallvec::smallvec;

use crate::error::TaskError;
use crate::position::{Position, Requirements};

/// Stage name reported for the initial supplier of a position.
pub const GENERATION_STAGE_NAME: &str = "Generation or Loading";

/// Output of one unit of stage work.
pub type TaskResult<C> = Result<Arc<C>, TaskError>;

type TaskFn<C> = dyn Fn(&[Arc<C>]) -> TaskResult<C> + Send + Sync;
type TaskFactory<C> = dyn Fn(Position) -> ChunkTask<C> + Send + Sync;

/// One unit of stage work for one position.
pub struct ChunkTask<C> {
  name: Arc<str>,
  position: Position,
  requirements: Requirements,
  run: Arc<TaskFn<C>>,
}

impl<C> Clone for ChunkTask<C> {
  fn clone(&self) -> Self {
    Self {
      name: Arc::clone(&self.name),
      position: self.position,
      requirements: self.requirements.clone(),
      run: Arc::clone(&self.run),
    }
  }
}

impl<C> std::fmt::Debug for ChunkTask<C> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChunkTask")
      .field("name", &self.name)
      .field("position", &self.position)
      .field("requirements", &self.requirements)
      .finish_non_exhaustive()
  }
}

impl<C: Send + Sync + 'static> ChunkTask<C> {
  /// `run` receives the chunks of `requirements`, in the same order.
  pub fn new<F>(
    name: impl Into<Arc<str>>,
    position: Position,
    requirements: Requirements,
    run: F,
  ) -> Self
  where
    F: Fn(&[Arc<C>]) -> TaskResult<C> + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      position,
      requirements,
      run: Arc::new(run),
    }
  }

  /// Initial supplier for a freshly submitted position. Requires nothing.
  pub(crate) fn generator<F>(position: Position, supplier: F) -> Self
  where
    F: Fn() -> TaskResult<C> + Send + Sync + 'static,
  {
    Self::new(
      GENERATION_STAGE_NAME,
      position,
      Requirements::new(),
      move |_: &[Arc<C>]| supplier(),
    )
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn position(&self) -> Position {
    self.position
  }

  pub fn requirements(&self) -> &[Position] {
    &self.requirements
  }

  /// Run the task on the calling thread.
  pub fn apply(&self, chunks: &[Arc<C>]) -> TaskResult<C> {
    (self.run)(chunks)
  }

  /// Bind resolved inputs into a closure for the executor.
  ///
  /// The closure enters a `chunk_task` span for the duration of the work.
  pub(crate) fn bind(&self, chunks: Vec<Arc<C>>) -> impl FnOnce() -> TaskResult<C> + Send + 'static {
    let name = Arc::clone(&self.name);
    let position = self.position;
    let run = Arc::clone(&self.run);
    move || {
      let _span = tracing::info_span!("chunk_task", task = %name, %position).entered();
      run(&chunks)
    }
  }
}

/// Named factory of per-position tasks. Registration order is execution
/// order.
pub struct Stage<C> {
  name: Arc<str>,
  factory: Arc<TaskFactory<C>>,
}

impl<C> Clone for Stage<C> {
  fn clone(&self) -> Self {
    Self {
      name: Arc::clone(&self.name),
      factory: Arc::clone(&self.factory),
    }
  }
}

impl<C> std::fmt::Debug for Stage<C> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Stage").field("name", &self.name).finish_non_exhaustive()
  }
}

impl<C: Send + Sync + 'static> Stage<C> {
  /// Stage with a custom task factory.
  pub fn new<F>(name: impl Into<Arc<str>>, factory: F) -> Self
  where
    F: Fn(Position) -> ChunkTask<C> + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      factory: Arc::new(factory),
    }
  }

  /// Stage whose task reads and produces only its own position's chunk.
  pub fn single<F>(name: impl Into<Arc<str>>, f: F) -> Self
  where
    F: Fn(Arc<C>) -> TaskResult<C> + Send + Sync + 'static,
  {
    let name: Arc<str> = name.into();
    let f = Arc::new(f);
    let task_name = Arc::clone(&name);
    Self::new(name, move |position| {
      let f = Arc::clone(&f);
      ChunkTask::new(
        Arc::clone(&task_name),
        position,
        smallvec![position],
        move |chunks: &[Arc<C>]| match chunks.first() {
          Some(chunk) => f(Arc::clone(chunk)),
          None => Err(TaskError::msg("single-chunk task received no chunk")),
        },
      )
    })
  }

  /// Single-chunk stage run for its side effect; the chunk passes through.
  pub fn inspect<F>(name: impl Into<Arc<str>>, f: F) -> Self
  where
    F: Fn(&C) + Send + Sync + 'static,
  {
    Self::single(name, move |chunk| {
      f(&chunk);
      Ok(chunk)
    })
  }

  /// Stage whose task reads the chunks at `requirements(position)`.
  ///
  /// `f` receives them in that order and returns the chunk for its own
  /// position, which is usually among its inputs.
  pub fn multi<F, R>(name: impl Into<Arc<str>>, f: F, requirements: R) -> Self
  where
    F: Fn(&[Arc<C>]) -> TaskResult<C> + Send + Sync + 'static,
    R: Fn(Position) -> Requirements + Send + Sync + 'static,
  {
    let name: Arc<str> = name.into();
    let f = Arc::new(f);
    let task_name = Arc::clone(&name);
    Self::new(name, move |position| {
      let f = Arc::clone(&f);
      ChunkTask::new(
        Arc::clone(&task_name),
        position,
        requirements(position),
        move |chunks: &[Arc<C>]| f(chunks),
      )
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Fresh task for `position`.
  pub fn make_task(&self, position: Position) -> ChunkTask<C> {
    (self.factory)(position)
  }
}

#[cfg(test)]
#[path = "stage_test.rs"]
mod stage_test;
