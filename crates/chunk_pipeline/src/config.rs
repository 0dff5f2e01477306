//! PipelineConfig - worker pool sizing and thread naming.

use crate::error::{PipelineError, Result};

/// Upper bound for the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Default number of tasks that may wait for a worker before submissions
/// are rejected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 800;

/// Configuration for a chunk processing pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
  /// Number of worker threads executing stage tasks.
  pub worker_threads: usize,

  /// Maximum number of submitted-but-not-started tasks.
  /// Submissions beyond this are rejected and retried on a later pass.
  pub queue_capacity: usize,

  /// Worker threads are named `"{worker_name_prefix}-{index}"`.
  pub worker_name_prefix: String,

  /// Name of the single reactor thread.
  pub reactor_name: String,
}

impl PipelineConfig {
  /// Worker count derived from hardware parallelism.
  ///
  /// Leaves one core for the caller and clamps to `1..=MAX_DEFAULT_WORKERS`.
  pub fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
      .map(|n| n.get().saturating_sub(1))
      .unwrap_or(1)
      .clamp(1, MAX_DEFAULT_WORKERS)
  }

  pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
    self.worker_threads = worker_threads;
    self
  }

  pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
    self.queue_capacity = queue_capacity;
    self
  }

  pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.worker_name_prefix = prefix.into();
    self
  }

  pub fn with_reactor_name(mut self, name: impl Into<String>) -> Self {
    self.reactor_name = name.into();
    self
  }

  /// Check that the configuration can start a pipeline.
  pub fn validate(&self) -> Result<()> {
    if self.worker_threads == 0 {
      return Err(PipelineError::InvalidConfig {
        parameter: "worker_threads",
        reason: "must be >= 1".to_string(),
      });
    }
    if self.queue_capacity == 0 {
      return Err(PipelineError::InvalidConfig {
        parameter: "queue_capacity",
        reason: "must be >= 1".to_string(),
      });
    }
    if self.worker_name_prefix.trim().is_empty() {
      return Err(PipelineError::InvalidConfig {
        parameter: "worker_name_prefix",
        reason: "must not be empty".to_string(),
      });
    }
    if self.reactor_name.trim().is_empty() {
      return Err(PipelineError::InvalidConfig {
        parameter: "reactor_name",
        reason: "must not be empty".to_string(),
      });
    }
    Ok(())
  }
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      worker_threads: Self::default_worker_threads(),
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      worker_name_prefix: "chunk-processing".to_string(),
      reactor_name: "chunk-processing-reactor".to_string(),
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
