//! Engine-agnostic metrics for chunk processing.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use chunk_pipeline::metrics::COLLECT_METRICS;
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let snapshot = pipeline.metrics();
//! println!("{} tasks, avg {:.0}us", snapshot.completed, snapshot.avg_task_us);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::sync::lock;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl RollingWindow<u64> {
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.buffer.iter().sum::<u64>() as f64 / self.buffer.len() as f64
        }
    }

    pub fn max(&self) -> Option<u64> {
        self.buffer.iter().copied().max()
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Counters and task timings for one pipeline.
///
/// Counters are atomics so workers and the reactor record without a shared
/// lock; only the timing window is behind a mutex.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    task_timings: Mutex<RollingWindow<u64>>,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Tasks accepted by the executor.
    pub submitted: u64,
    /// Positions that finished every stage.
    pub completed: u64,
    /// Positions whose processing failed.
    pub failed: u64,
    /// Positions stopped before finishing.
    pub cancelled: u64,
    /// Submissions rejected because the queue was full.
    pub rejected: u64,
    /// Average task execution time over the rolling window.
    pub avg_task_us: f64,
    /// Slowest task in the rolling window.
    pub max_task_us: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        if is_enabled() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_submitted(&self) {
        Self::bump(&self.submitted);
    }

    pub fn record_completed(&self) {
        Self::bump(&self.completed);
    }

    pub fn record_failed(&self) {
        Self::bump(&self.failed);
    }

    pub fn record_cancelled(&self) {
        Self::bump(&self.cancelled);
    }

    pub fn record_rejected(&self) {
        Self::bump(&self.rejected);
    }

    /// Record how long one task ran on its worker.
    pub fn record_task_timing(&self, timing_us: u64) {
        if is_enabled() {
            lock(&self.task_timings).push(timing_us);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timings = lock(&self.task_timings);
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            avg_task_us: timings.average(),
            max_task_us: timings.max().unwrap_or(0),
        }
    }

    /// Reset timings. Counters are cumulative and kept.
    pub fn reset_timings(&self) {
        lock(&self.task_timings).clear();
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window() {
        let mut window = RollingWindow::new(3);
        assert!(window.is_empty());

        window.push(10u64);
        window.push(20);
        window.push(30);
        assert_eq!(window.len(), 3);
        assert_eq!(window.average(), 20.0);

        // Push one more, oldest should be evicted
        window.push(40);
        assert_eq!(window.len(), 3);
        assert_eq!(window.average(), 30.0);
        assert_eq!(window.max(), Some(40));
        assert_eq!(window.last(), Some(&40));
    }

    #[test]
    fn test_zero_capacity_window_stays_empty() {
        let mut window = RollingWindow::new(0);
        window.push(1u64);
        assert!(window.is_empty());
    }

    #[test]
    fn test_counters_and_timings() {
        let metrics = PipelineMetrics::new();

        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_completed();
        metrics.record_failed();
        metrics.record_rejected();
        metrics.record_task_timing(100);
        metrics.record_task_timing(300);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 0);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.avg_task_us, 200.0);
        assert_eq!(snapshot.max_task_us, 300);

        metrics.reset_timings();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_task_us, 0.0);
        assert_eq!(snapshot.submitted, 2, "Counters survive a timing reset");
    }
}
