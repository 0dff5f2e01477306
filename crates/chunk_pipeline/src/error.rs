//! Error types for chunk processing.
//!
//! Failures are reported per position through the position's completion
//! handle. There is no global error channel, so both error types are `Clone`:
//! every clone of a handle observes the same failure.

use std::sync::Arc;

use thiserror::Error;

use crate::position::Position;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Shared, thread-safe error source carried by [`TaskError::Failed`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Error produced by a single unit of stage work.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
  /// The stage function returned an error.
  #[error("{message}")]
  Failed {
    /// Human-readable description.
    message: String,
    /// Underlying cause, if the stage wrapped one.
    #[source]
    source: Option<SharedError>,
  },

  /// The stage function panicked; the payload is rendered to text.
  #[error("task panicked: {0}")]
  Panicked(String),

  /// The task noticed its handle was cancelled and stopped early.
  #[error("task was interrupted")]
  Interrupted,
}

impl TaskError {
  /// Wrap an arbitrary error as the cause of a stage failure.
  pub fn new<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Failed {
      message: err.to_string(),
      source: Some(Arc::new(err)),
    }
  }

  /// Stage failure with a message and no underlying cause.
  pub fn msg(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
      source: None,
    }
  }

  /// Render a `catch_unwind` payload.
  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    Self::Panicked(text)
  }
}

/// Error type for pipeline operations and per-position failures.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
  /// A stage (or the initial supplier) failed for this position.
  #[error("chunk task at {position} in stage [{stage}] failed: {source}")]
  TaskFailed {
    /// Position whose processing failed.
    position: Position,
    /// Name of the stage that failed.
    stage: String,
    /// The task error that caused the failure.
    #[source]
    source: TaskError,
  },

  /// Processing was stopped before the chunk finished.
  #[error("chunk processing at {position} was cancelled")]
  Cancelled {
    /// Position whose processing was cancelled.
    position: Position,
  },

  /// The executor already holds `capacity` pending tasks.
  #[error("cannot run work for {position}: task queue is full ({capacity} pending)")]
  QueueFull {
    /// Position whose work was rejected.
    position: Position,
    /// Configured queue capacity.
    capacity: usize,
  },

  /// The executor no longer accepts work.
  #[error("chunk processing pipeline is shut down")]
  ShutDown,

  /// A bounded wait on a handle elapsed.
  #[error("timed out waiting for chunk at {position}")]
  Timeout {
    /// Position that was being waited on.
    position: Position,
  },

  /// Invalid configuration value.
  #[error("invalid parameter '{parameter}': {reason}")]
  InvalidConfig {
    /// The parameter name.
    parameter: &'static str,
    /// Explanation of why it's invalid.
    reason: String,
  },

  /// Worker or reactor threads could not be started.
  #[error("failed to start chunk processing threads: {0}")]
  ThreadPool(String),
}

impl PipelineError {
  /// True for the silently-swallowed cancellation condition.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled { .. })
  }
}
