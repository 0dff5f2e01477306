//! Completion-ordered executor on a dedicated rayon pool.
//!
//! Work is submitted with the position it belongs to. Jobs wait in a bounded
//! priority queue until a worker is free, and finished jobs are delivered
//! through a second priority queue, so the consumer sees completions in
//! priority order rather than in the order workers happened to finish.
//!
//! # Usage
//!
//! ```ignore
//! let executor = CompletionExecutor::new(&config, priority, metrics)?;
//!
//! // Queue work (non-blocking)
//! let handle = executor.submit(position, move || generate(position))?;
//!
//! // Consume completions, highest priority first
//! while let Next::Ready(completion) = executor.take() {
//!     handle_completion(completion);
//! }
//! ```

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::completion_queue::{Next, PriorityQueue, PushError};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, TaskError};
use crate::metrics::PipelineMetrics;
use crate::position::Position;
use crate::priority::TaskPriority;

/// Unique identifier for a submitted task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

#[derive(Debug)]
struct HandleInner {
  id: TaskId,
  position: Position,
  cancelled: AtomicBool,
}

/// Cancellation handle for one submitted task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
  inner: Arc<HandleInner>,
}

impl TaskHandle {
  fn new(position: Position) -> Self {
    Self {
      inner: Arc::new(HandleInner {
        id: TaskId::next(),
        position,
        cancelled: AtomicBool::new(false),
      }),
    }
  }

  pub fn id(&self) -> TaskId {
    self.inner.id
  }

  pub fn position(&self) -> Position {
    self.inner.position
  }

  /// Request cancellation. A queued task is skipped; a running task sees
  /// [`is_current_task_cancelled`] turn true and its result is discarded.
  pub fn cancel(&self) {
    self.inner.cancelled.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::Acquire)
  }
}

thread_local! {
  static CURRENT_TASK: RefCell<Option<TaskHandle>> = const { RefCell::new(None) };
}

/// True when called from inside a task whose handle has been cancelled.
///
/// Long-running stage functions poll this and return
/// [`TaskError::Interrupted`] to stop early. Always false outside a task.
pub fn is_current_task_cancelled() -> bool {
  CURRENT_TASK.with(|current| {
    current
      .borrow()
      .as_ref()
      .is_some_and(TaskHandle::is_cancelled)
  })
}

/// Restores the previous current task on drop, including during unwinding.
struct CurrentTaskGuard(Option<TaskHandle>);

impl CurrentTaskGuard {
  fn enter(handle: TaskHandle) -> Self {
    Self(CURRENT_TASK.with(|current| current.replace(Some(handle))))
  }
}

impl Drop for CurrentTaskGuard {
  fn drop(&mut self) {
    let previous = self.0.take();
    CURRENT_TASK.with(|current| *current.borrow_mut() = previous);
  }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
  /// The work ran to completion (successfully or not).
  Finished(std::result::Result<T, TaskError>),
  /// The handle was cancelled before or while the work ran.
  Cancelled,
}

/// A finished task, tagged with its handle.
#[derive(Debug)]
pub struct Completion<T> {
  pub handle: TaskHandle,
  pub outcome: TaskOutcome<T>,
}

impl<T> Completion<T> {
  pub fn position(&self) -> Position {
    self.handle.position()
  }
}

type Work<T> = Box<dyn FnOnce() -> std::result::Result<T, TaskError> + Send>;

struct Job<T> {
  handle: TaskHandle,
  work: Work<T>,
}

/// Fixed-size worker pool with priority-ordered pending and completed queues.
pub struct CompletionExecutor<T> {
  pool: rayon::ThreadPool,
  pending: Arc<PriorityQueue<Job<T>>>,
  completed: Arc<PriorityQueue<Completion<T>>>,
  accepting: AtomicBool,
  capacity: usize,
  metrics: Arc<PipelineMetrics>,
}

impl<T: Send + 'static> CompletionExecutor<T> {
  /// Start `config.worker_threads` workers named `"{prefix}-{i}"`.
  pub fn new(
    config: &PipelineConfig,
    priority: Arc<dyn TaskPriority>,
    metrics: Arc<PipelineMetrics>,
  ) -> Result<Self> {
    config.validate()?;

    let prefix = config.worker_name_prefix.clone();
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(config.worker_threads)
      .thread_name(move |index| format!("{prefix}-{index}"))
      .panic_handler(|payload| {
        tracing::error!("chunk worker panicked: {}", TaskError::from_panic(payload));
      })
      .build()
      .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    Ok(Self {
      pool,
      pending: Arc::new(PriorityQueue::new(
        Arc::clone(&priority),
        Some(config.queue_capacity),
      )),
      completed: Arc::new(PriorityQueue::new(priority, None)),
      accepting: AtomicBool::new(true),
      capacity: config.queue_capacity,
      metrics,
    })
  }

  /// Queue `work` for `position` (non-blocking).
  ///
  /// Fails with [`PipelineError::QueueFull`] when `queue_capacity` tasks are
  /// already waiting for a worker, and with [`PipelineError::ShutDown`]
  /// after [`shutdown`](Self::shutdown). Rejections are not retried here.
  pub fn submit<F>(&self, position: Position, work: F) -> Result<TaskHandle>
  where
    F: FnOnce() -> std::result::Result<T, TaskError> + Send + 'static,
  {
    if !self.accepting.load(Ordering::Acquire) {
      return Err(PipelineError::ShutDown);
    }

    let handle = TaskHandle::new(position);
    let job = Job {
      handle: handle.clone(),
      work: Box::new(work),
    };

    match self.pending.push(position, job) {
      Ok(()) => {}
      Err(PushError::Full(_)) => {
        tracing::error!(
          %position,
          capacity = self.capacity,
          "cannot run chunk task because queue is full"
        );
        self.metrics.record_rejected();
        return Err(PipelineError::QueueFull {
          position,
          capacity: self.capacity,
        });
      }
      Err(PushError::Closed(_)) => return Err(PipelineError::ShutDown),
    }
    self.metrics.record_submitted();

    // One pool job per queued job; each pops whatever is highest priority
    // when it gets a worker.
    let pending = Arc::clone(&self.pending);
    let completed = Arc::clone(&self.completed);
    let metrics = Arc::clone(&self.metrics);
    self
      .pool
      .spawn(move || run_next(&pending, &completed, &metrics));

    Ok(handle)
  }

  /// Block until a completion arrives, [`wake`](Self::wake) is called, or
  /// the executor shuts down.
  pub fn take(&self) -> Next<Completion<T>> {
    self.completed.take()
  }

  /// Next completion without blocking.
  pub fn poll(&self) -> Option<Completion<T>> {
    self.completed.poll()
  }

  /// Next completion, waiting at most `timeout`.
  pub fn poll_timeout(&self, timeout: Duration) -> Option<Completion<T>> {
    self.completed.poll_timeout(timeout)
  }

  /// Make the consumer's blocked [`take`](Self::take) return
  /// [`Next::Woken`].
  pub fn wake(&self) {
    self.completed.wake();
  }

  /// Drop every job that has not started yet, cancelling its handle.
  /// Returns how many were dropped.
  pub fn clear_pending(&self) -> usize {
    let dropped = self.pending.clear();
    for job in &dropped {
      job.handle.cancel();
    }
    dropped.len()
  }

  /// Stop accepting work, drop queued jobs and release the consumer.
  ///
  /// Running jobs finish on their workers; their completions are discarded.
  pub fn shutdown(&self) {
    if !self.accepting.swap(false, Ordering::AcqRel) {
      return;
    }
    self.pending.close();
    let dropped = self.clear_pending();
    self.completed.close();
    tracing::debug!(dropped, "chunk executor shut down");
  }

  pub fn is_shutdown(&self) -> bool {
    !self.accepting.load(Ordering::Acquire)
  }

  pub fn num_threads(&self) -> usize {
    self.pool.current_num_threads()
  }

  /// Jobs waiting for a worker.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Completions waiting for the consumer.
  pub fn completed_count(&self) -> usize {
    self.completed.len()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

impl<T> Drop for CompletionExecutor<T> {
  fn drop(&mut self) {
    self.accepting.store(false, Ordering::Release);
    self.pending.close();
    self.completed.close();
  }
}

fn run_next<T>(
  pending: &PriorityQueue<Job<T>>,
  completed: &PriorityQueue<Completion<T>>,
  metrics: &PipelineMetrics,
) {
  // Cleared by shutdown or restart.
  let Some(Job { handle, work }) = pending.poll() else {
    return;
  };

  let outcome = if handle.is_cancelled() {
    TaskOutcome::Cancelled
  } else {
    let started = Instant::now();
    let result = {
      let _current = CurrentTaskGuard::enter(handle.clone());
      panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        Err(TaskError::from_panic(payload))
      })
    };
    metrics.record_task_timing(started.elapsed().as_micros() as u64);

    if handle.is_cancelled() {
      TaskOutcome::Cancelled
    } else {
      TaskOutcome::Finished(result)
    }
  };

  let position = handle.position();
  if completed
    .push(position, Completion { handle, outcome })
    .is_err()
  {
    tracing::trace!(%position, "completion dropped after shutdown");
  }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;
