//! Priority-ordered blocking queue keyed by chunk position.
//!
//! Following the executor's two-queue layout: Submit → Pending → Run →
//! Completed → Reactor. Both queues are instances of [`PriorityQueue`]:
//!
//! - **pending**: bounded; workers pop the highest-priority job when they
//!   become free
//! - **completed**: unbounded; the reactor pops finished work in priority
//!   order, not in the order workers happened to finish
//!
//! Ties are broken by insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use web_time::Instant;

use crate::position::Position;
use crate::priority::TaskPriority;
use crate::sync::{lock, wait, wait_timeout};

/// Why a push was refused. The item is handed back.
#[derive(Debug)]
pub enum PushError<E> {
  /// The queue holds `capacity` items already.
  Full(E),
  /// The queue was closed.
  Closed(E),
}

/// Result of a blocking [`PriorityQueue::take`].
#[derive(Debug)]
pub enum Next<E> {
  /// Highest-priority item.
  Ready(E),
  /// [`PriorityQueue::wake`] was called with nothing queued.
  Woken,
  /// The queue was closed.
  Closed,
}

struct Entry<E> {
  position: Position,
  seq: u64,
  priority: Arc<dyn TaskPriority>,
  item: E,
}

impl<E> Ord for Entry<E> {
  fn cmp(&self, other: &Self) -> Ordering {
    // BinaryHeap pops the greatest entry, and `Less` from the priority means
    // "run first", so both comparisons are reversed.
    self
      .priority
      .compare(other.position, self.position)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

impl<E> PartialOrd for Entry<E> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<E> PartialEq for Entry<E> {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl<E> Eq for Entry<E> {}

struct QueueState<E> {
  heap: BinaryHeap<Entry<E>>,
  next_seq: u64,
  closed: bool,
  woken: bool,
}

/// Blocking priority queue of position-tagged items.
pub struct PriorityQueue<E> {
  state: Mutex<QueueState<E>>,
  available: Condvar,
  priority: Arc<dyn TaskPriority>,
  capacity: Option<usize>,
}

impl<E> PriorityQueue<E> {
  /// Create a queue. `capacity = None` means unbounded.
  pub fn new(priority: Arc<dyn TaskPriority>, capacity: Option<usize>) -> Self {
    Self {
      state: Mutex::new(QueueState {
        heap: BinaryHeap::new(),
        next_seq: 0,
        closed: false,
        woken: false,
      }),
      available: Condvar::new(),
      priority,
      capacity,
    }
  }

  /// Enqueue an item for `position` and wake one waiter.
  pub fn push(&self, position: Position, item: E) -> Result<(), PushError<E>> {
    let mut state = lock(&self.state);
    if state.closed {
      return Err(PushError::Closed(item));
    }
    if let Some(capacity) = self.capacity {
      if state.heap.len() >= capacity {
        return Err(PushError::Full(item));
      }
    }

    let seq = state.next_seq;
    state.next_seq += 1;
    state.heap.push(Entry {
      position,
      seq,
      priority: Arc::clone(&self.priority),
      item,
    });
    drop(state);

    self.available.notify_one();
    Ok(())
  }

  /// Pop the highest-priority item without blocking.
  pub fn poll(&self) -> Option<E> {
    lock(&self.state).heap.pop().map(|entry| entry.item)
  }

  /// Block until an item arrives, the queue is woken, or it is closed.
  ///
  /// Queued items are still handed out after `close` only if they were not
  /// cleared; a closed queue with items returns them first.
  pub fn take(&self) -> Next<E> {
    let mut state = lock(&self.state);
    loop {
      if let Some(entry) = state.heap.pop() {
        return Next::Ready(entry.item);
      }
      if state.closed {
        return Next::Closed;
      }
      if state.woken {
        state.woken = false;
        return Next::Woken;
      }
      state = wait(&self.available, state);
    }
  }

  /// Pop the highest-priority item, waiting at most `timeout`.
  pub fn poll_timeout(&self, timeout: Duration) -> Option<E> {
    let deadline = Instant::now() + timeout;
    let mut state = lock(&self.state);
    loop {
      if let Some(entry) = state.heap.pop() {
        return Some(entry.item);
      }
      if state.closed {
        return None;
      }
      let now = Instant::now();
      if now >= deadline {
        return None;
      }
      state = wait_timeout(&self.available, state, deadline - now).0;
    }
  }

  /// Make one blocked (or the next) `take` return [`Next::Woken`].
  pub fn wake(&self) {
    lock(&self.state).woken = true;
    self.available.notify_one();
  }

  /// Refuse further pushes and release every waiter.
  pub fn close(&self) {
    lock(&self.state).closed = true;
    self.available.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    lock(&self.state).closed
  }

  /// Remove and return every queued item, highest priority first.
  pub fn clear(&self) -> Vec<E> {
    let mut state = lock(&self.state);
    let mut drained = Vec::with_capacity(state.heap.len());
    while let Some(entry) = state.heap.pop() {
      drained.push(entry.item);
    }
    drained
  }

  pub fn len(&self) -> usize {
    lock(&self.state).heap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
#[path = "completion_queue_test.rs"]
mod completion_queue_test;
