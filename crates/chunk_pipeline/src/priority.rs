//! Task priorities.
//!
//! Both the pending-work queue and the completion queue order entries with a
//! caller-supplied [`TaskPriority`] instead of FIFO, so chunks near the viewer
//! advance ahead of distant ones even when they were submitted later.
//!
//! Entries already queued are not re-sorted when a priority's inputs change
//! (e.g. the viewer moves); new pushes and pops use the current ordering.

use std::cmp::Ordering;
use std::sync::RwLock;

use crate::position::{distance_squared, Position};
use crate::sync::{read, write};

/// Ordering over chunk positions. `Less` means "run first".
pub trait TaskPriority: Send + Sync + 'static {
  fn compare(&self, a: Position, b: Position) -> Ordering;
}

impl<F> TaskPriority for F
where
  F: Fn(Position, Position) -> Ordering + Send + Sync + 'static,
{
  #[inline]
  fn compare(&self, a: Position, b: Position) -> Ordering {
    self(a, b)
  }
}

/// Every position ties; submission order decides.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fifo;

impl TaskPriority for Fifo {
  #[inline]
  fn compare(&self, _a: Position, _b: Position) -> Ordering {
    Ordering::Equal
  }
}

/// Positions closer to a movable center run first.
#[derive(Debug, Default)]
pub struct NearestFirst {
  center: RwLock<Position>,
}

impl NearestFirst {
  pub fn new(center: Position) -> Self {
    Self {
      center: RwLock::new(center),
    }
  }

  pub fn center(&self) -> Position {
    *read(&self.center)
  }

  /// Move the center (e.g. the viewer's chunk).
  pub fn set_center(&self, center: Position) {
    *write(&self.center) = center;
  }
}

impl TaskPriority for NearestFirst {
  fn compare(&self, a: Position, b: Position) -> Ordering {
    let center = self.center();
    distance_squared(a, center).cmp(&distance_squared(b, center))
  }
}
