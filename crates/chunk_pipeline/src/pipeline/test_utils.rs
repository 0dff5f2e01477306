//! Test utilities for pipeline tests.
//!
//! Provides a recording chunk type, a finished-chunk store and polling
//! helpers shared by the stage, record and pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use web_time::Instant;

use crate::chunk::{Chunk, ChunkLookup};
use crate::position::Position;

/// Upper bound for any wait in tests.
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Test chunk
// =============================================================================

/// Chunk that records which stages touched it and how often it was disposed.
#[derive(Debug)]
pub struct TestChunk {
  position: Position,
  history: Mutex<Vec<String>>,
  disposed: AtomicUsize,
}

impl TestChunk {
  pub fn new(position: Position) -> Arc<Self> {
    Arc::new(Self {
      position,
      history: Mutex::new(Vec::new()),
      disposed: AtomicUsize::new(0),
    })
  }

  pub fn position(&self) -> Position {
    self.position
  }

  pub fn record(&self, entry: &str) {
    self.history.lock().unwrap().push(entry.to_string());
  }

  pub fn history(&self) -> Vec<String> {
    self.history.lock().unwrap().clone()
  }

  pub fn dispose_count(&self) -> usize {
    self.disposed.load(Ordering::SeqCst)
  }
}

impl Chunk for TestChunk {
  fn position(&self) -> Position {
    self.position
  }

  fn dispose(&self) {
    self.disposed.fetch_add(1, Ordering::SeqCst);
  }
}

// =============================================================================
// Finished-chunk store
// =============================================================================

/// Shared map standing in for the world's store of finished chunks.
#[derive(Clone, Default)]
pub struct ReadyStore {
  chunks: Arc<Mutex<HashMap<Position, Arc<TestChunk>>>>,
}

impl ReadyStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, chunk: Arc<TestChunk>) {
    self.chunks.lock().unwrap().insert(chunk.position(), chunk);
  }

  pub fn contains(&self, position: Position) -> bool {
    self.chunks.lock().unwrap().contains_key(&position)
  }
}

impl ChunkLookup<TestChunk> for ReadyStore {
  fn lookup(&self, position: Position) -> Option<Arc<TestChunk>> {
    self.chunks.lock().unwrap().get(&position).cloned()
  }
}

/// Lookup that never finds anything.
pub fn empty_lookup(_: Position) -> Option<Arc<TestChunk>> {
  None
}

// =============================================================================
// Polling
// =============================================================================

/// Poll `condition` every millisecond until it holds or [`WAIT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + WAIT;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(1));
  }
  condition()
}
