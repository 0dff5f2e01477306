//! Collaborator seams: the chunk itself and the finished-chunk store.

use std::sync::Arc;

use crate::position::Position;

/// Disposable unit of world data for one grid position.
///
/// The pipeline treats chunks as opaque. They are shared as `Arc<C>` between
/// the owning processing record and the tasks that read them, so any mutation
/// a stage performs on its own target goes through interior mutability in
/// the implementing type. Tasks must not mutate chunks of other positions.
pub trait Chunk: Send + Sync + 'static {
  /// Grid position this chunk belongs to.
  fn position(&self) -> Position;

  /// Release GPU buffers, light data and other resources.
  ///
  /// Called exactly once by the pipeline when processing of a held chunk is
  /// cancelled or fails.
  fn dispose(&self);
}

/// Authoritative store of chunks that have fully exited the pipeline.
///
/// Consulted by the reactor while it holds the pipeline's record lock, so an
/// implementation must not call back into the pipeline.
pub trait ChunkLookup<C>: Send + Sync {
  fn lookup(&self, position: Position) -> Option<Arc<C>>;
}

impl<C, F> ChunkLookup<C> for F
where
  F: Fn(Position) -> Option<Arc<C>> + Send + Sync,
{
  #[inline]
  fn lookup(&self, position: Position) -> Option<Arc<C>> {
    self(position)
  }
}
