//! The reactor: a single thread that serializes every state transition.
//!
//! ```text
//!            ┌──────────────────────── completion (priority order) ─────┐
//!            ▼                                                          │
//!   ┌────────────────┐   advance / finish / fail   ┌──────────────┐     │
//!   │ on_completion  ├────────────────────────────►│ records map  │     │
//!   └───────┬────────┘                             └──────┬───────┘     │
//!           │ settle handles (no lock held)               │             │
//!           ▼                                             ▼             │
//!   ┌────────────────┐  requirements resolved?   ┌────────────────┐     │
//!   │ attempt_to_run ├──────────────────────────►│    executor    ├─────┘
//!   └────────────────┘   lookup, then borrow     └────────────────┘
//! ```
//!
//! Dependency checks are level-triggered: every completion rescans every
//! waiting record. A record whose requirements are not all resolvable stays
//! waiting until a later pass.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use super::record::ProcessingRecord;
use super::stage::Stage;
use crate::chunk::{Chunk, ChunkLookup};
use crate::completion_queue::Next;
use crate::error::{PipelineError, TaskError};
use crate::executor::{Completion, CompletionExecutor, TaskOutcome};
use crate::metrics::PipelineMetrics;
use crate::position::Position;
use crate::sync::{lock, read};

/// State shared by the facade and the reactor thread.
pub(crate) struct Shared<C> {
  pub stages: RwLock<Vec<Arc<Stage<C>>>>,
  pub records: Mutex<HashMap<Position, ProcessingRecord<C>>>,
  pub executor: CompletionExecutor<Arc<C>>,
  pub lookup: Box<dyn ChunkLookup<C>>,
  pub metrics: Arc<PipelineMetrics>,
}

/// Handle resolution deferred until the record lock is released, so
/// completion callbacks may call back into the pipeline.
pub(crate) enum Settle<C> {
  Finish(ProcessingRecord<C>),
  Fail(ProcessingRecord<C>, PipelineError),
  Stop(ProcessingRecord<C>),
}

impl<C: Chunk> Settle<C> {
  pub fn apply(self) {
    match self {
      Self::Finish(record) => record.finish(),
      Self::Fail(record, error) => record.fail(error),
      Self::Stop(record) => record.stop(),
    }
  }
}

pub(crate) fn settle_all<C: Chunk>(settle: Vec<Settle<C>>) {
  for action in settle {
    action.apply();
  }
}

/// Reactor thread body. Returns once the executor is shut down.
pub(crate) fn run<C: Chunk>(shared: Arc<Shared<C>>) {
  tracing::debug!("chunk processing reactor started");
  loop {
    let event = shared.executor.take();
    let handled = panic::catch_unwind(AssertUnwindSafe(|| match event {
      Next::Ready(completion) => {
        shared.on_completion(completion);
        true
      }
      Next::Woken => {
        shared.attempt_to_run();
        true
      }
      Next::Closed => false,
    }));

    match handled {
      Ok(true) => {}
      Ok(false) => break,
      Err(payload) => {
        tracing::error!(
          "chunk processing reactor recovered from panic: {}",
          TaskError::from_panic(payload)
        );
      }
    }
  }
  tracing::debug!("chunk processing reactor stopped");
}

impl<C: Chunk> Shared<C> {
  fn on_completion(&self, completion: Completion<Arc<C>>) {
    let position = completion.position();
    let mut settle = Vec::new();
    {
      let stages = read(&self.stages);
      let mut records = lock(&self.records);

      let current = records
        .get(&position)
        .and_then(ProcessingRecord::in_flight)
        .is_some_and(|in_flight| in_flight.id() == completion.handle.id());
      if !current {
        tracing::trace!(%position, "discarding orphaned chunk completion");
        return;
      }

      match completion.outcome {
        TaskOutcome::Cancelled => {
          tracing::trace!(%position, "chunk task cancelled");
          if let Some(record) = records.get_mut(&position) {
            record.clear_in_flight();
          }
        }
        TaskOutcome::Finished(Err(source)) => {
          if let Some(record) = records.remove(&position) {
            let stage = record.stage_name(&stages);
            tracing::error!(
              %position,
              stage = %stage,
              error = %source,
              "chunk task failed"
            );
            self.metrics.record_failed();
            let error = PipelineError::TaskFailed {
              position,
              stage,
              source,
            };
            settle.push(Settle::Fail(record, error));
          }
        }
        TaskOutcome::Finished(Ok(chunk)) => {
          if let Some(record) = records.get_mut(&position) {
            record.reset_task_state();
            record.set_chunk(chunk);

            if record.has_next_stage(stages.len()) {
              let index = record.next_stage();
              record.make_task(&stages);
              tracing::debug!(%position, stage = index, "chunk advanced");
            } else if let Some(record) = records.remove(&position) {
              if record.external().is_cancelled() {
                tracing::debug!(%position, "chunk handle cancelled by caller");
                self.metrics.record_cancelled();
                settle.push(Settle::Stop(record));
              } else {
                tracing::debug!(%position, "chunk processing finished");
                self.metrics.record_completed();
                settle.push(Settle::Finish(record));
              }
            }
          }
        }
      }
    }

    // Finished chunks usually reach the lookup from their callbacks, so
    // settle before neighbors are re-checked.
    settle_all(settle);
    self.attempt_to_run();
  }

  /// Submit every waiting task whose requirements now resolve.
  #[tracing::instrument(skip_all, name = "chunk_pipeline::attempt_to_run")]
  pub(crate) fn attempt_to_run(&self) {
    let mut settle = Vec::new();
    {
      let stages = read(&self.stages);
      let mut records = lock(&self.records);

      let abandoned: Vec<Position> = records
        .values()
        .filter(|record| record.external().is_cancelled())
        .map(ProcessingRecord::position)
        .collect();
      for position in abandoned {
        if let Some(record) = records.remove(&position) {
          tracing::debug!(%position, "chunk handle cancelled by caller");
          self.metrics.record_cancelled();
          settle.push(Settle::Stop(record));
        }
      }

      let waiting: Vec<Position> = records
        .values()
        .filter(|record| record.is_waiting())
        .map(ProcessingRecord::position)
        .collect();

      for position in waiting {
        let Some(record) = records.get(&position) else {
          continue;
        };
        let Some(task) = record.task() else {
          continue;
        };
        let Some(inputs) = self.resolve_requirements(&records, task.requirements(), record.stage())
        else {
          tracing::trace!(%position, stage = %record.stage_name(&stages), "chunk waiting on requirements");
          continue;
        };
        let work = task.bind(inputs);

        match self.executor.submit(position, work) {
          Ok(handle) => {
            if let Some(record) = records.get_mut(&position) {
              record.set_in_flight(handle);
            }
          }
          // Stays waiting; the next pass retries it.
          Err(PipelineError::QueueFull { .. }) => {}
          Err(error) => {
            tracing::debug!(%error, "chunk executor stopped accepting work");
            break;
          }
        }
      }
    }
    settle_all(settle);
  }

  /// Chunks for `requirements`, in order, or `None` if any is unavailable.
  fn resolve_requirements(
    &self,
    records: &HashMap<Position, ProcessingRecord<C>>,
    requirements: &[Position],
    required_stage: Option<usize>,
  ) -> Option<Vec<Arc<C>>> {
    requirements
      .iter()
      .map(|&position| self.chunk_at(records, position, required_stage))
      .collect()
  }

  /// The finished chunk from the lookup, or the chunk held by an in-flight
  /// record that has reached at least `required_stage`.
  fn chunk_at(
    &self,
    records: &HashMap<Position, ProcessingRecord<C>>,
    position: Position,
    required_stage: Option<usize>,
  ) -> Option<Arc<C>> {
    if let Some(chunk) = self.lookup.lookup(position) {
      return Some(chunk);
    }
    let candidate = records.get(&position)?;
    if candidate.stage() >= required_stage {
      candidate.chunk().cloned()
    } else {
      None
    }
  }

  /// Remove every record. The caller stops them outside the lock.
  pub(crate) fn drain(&self) -> Vec<ProcessingRecord<C>> {
    let drained: Vec<_> = lock(&self.records).drain().map(|(_, record)| record).collect();
    for _ in &drained {
      self.metrics.record_cancelled();
    }
    drained
  }
}
